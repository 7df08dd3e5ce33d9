use domain::{CatalogEntry, DeviceId, DeviceKind};
use fieldgw_registry::DeviceRegistry;
use fieldgw_report::{
    DispatchConfig, QueuedSink, RecordingSink, Report, ReportChannel, ReportError, ReportSink,
    ReportWriter, report_status_once, spawn_status_reporter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn registry_with_two_devices() -> DeviceRegistry {
    let registry = DeviceRegistry::new();
    for (id, code) in [(1, "DIBANG-001"), (2, "RFID-001")] {
        let entry = CatalogEntry {
            id: DeviceId(id),
            port: 10000 + id as u16,
            code: code.to_string(),
        };
        let kind = DeviceKind::from_code(code).expect("kind");
        registry.register(&entry, kind);
    }
    registry
}

#[test]
fn status_tick_reports_every_device() {
    let registry = registry_with_two_devices();
    let binding = registry
        .bind(DeviceId(1), SocketAddr::from(([127, 0, 0, 1], 4000)))
        .expect("bind");
    assert!(registry.mark_command_failure(&binding.lease));

    let sink = RecordingSink::new();
    assert_eq!(report_status_once(&registry, &sink), 2);

    // 每台设备一条记录，isOk 与 state 同时送达
    let reports = sink.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.channel == ReportChannel::Status));
    let values = reports
        .iter()
        .map(|r| {
            let fields = r
                .fields
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .collect::<Vec<_>>();
            (r.device_id.0, fields)
        })
        .collect::<Vec<_>>();
    assert_eq!(
        values,
        vec![
            (1, vec![("isOk", "0"), ("state", "2")]),
            (2, vec![("isOk", "1"), ("state", "1")]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn status_reporter_ticks_on_period() {
    let registry = Arc::new(registry_with_two_devices());
    let sink = Arc::new(RecordingSink::new());
    let handle = spawn_status_reporter(registry, sink.clone(), Duration::from_secs(10));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(sink.is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(sink.len(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.len(), 4);
    handle.abort();
}

#[derive(Default)]
struct CollectingWriter {
    written: Mutex<Vec<Report>>,
}

#[async_trait::async_trait]
impl ReportWriter for CollectingWriter {
    async fn write(&self, report: &Report) -> Result<(), ReportError> {
        self.written.lock().await.push(report.clone());
        Ok(())
    }
}

#[tokio::test]
async fn queued_sink_delivers_in_order() {
    let writer = Arc::new(CollectingWriter::default());
    let (sink, handle) = QueuedSink::spawn(writer.clone(), DispatchConfig::default());
    for value in ["1", "2", "3"] {
        sink.submit(Report::reading(
            DeviceId(9),
            DeviceKind::SmartWeighScale,
            "weight",
            value,
            1,
        ));
    }
    drop(sink);
    handle.await.expect("dispatcher finished");

    let written = writer.written.lock().await;
    let values = written
        .iter()
        .map(|r| r.field("weight").expect("weight"))
        .collect::<Vec<_>>();
    assert_eq!(values, vec!["1", "2", "3"]);
}
