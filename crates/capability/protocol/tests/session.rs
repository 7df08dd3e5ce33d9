use domain::{CatalogEntry, CommandStatus, DeviceId, DeviceKind, LifecycleState};
use fieldgw_protocol::{SessionConfig, SessionContext, SessionOutcome, driver_for, run_session};
use fieldgw_registry::{Binding, DeviceRegistry};
use fieldgw_report::RecordingSink;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};

const DEVICE: DeviceId = DeviceId(7);

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn bound(kind: DeviceKind) -> (Arc<DeviceRegistry>, Binding) {
    let registry = Arc::new(DeviceRegistry::new());
    let entry = CatalogEntry {
        id: DEVICE,
        port: 9000,
        code: format!("{}-007", kind.prefix()),
    };
    registry.register(&entry, kind);
    let binding = registry.bind(DEVICE, peer(4000)).expect("bind");
    (registry, binding)
}

fn context(registry: &Arc<DeviceRegistry>, sink: &Arc<RecordingSink>) -> SessionContext {
    SessionContext::new(registry.clone(), sink.clone(), SessionConfig::default())
}

fn state(registry: &DeviceRegistry) -> (LifecycleState, CommandStatus) {
    let device = registry.lookup(DEVICE).expect("device");
    (device.state, device.command)
}

/// 按脚本返回数据或错误，脚本耗尽后永远挂起。
struct ScriptedStream {
    script: VecDeque<io::Result<&'static [u8]>>,
}

impl ScriptedStream {
    fn new(script: Vec<io::Result<&'static [u8]>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.script.pop_front() {
            Some(Ok(chunk)) => {
                buf.put_slice(chunk);
                Poll::Ready(Ok(()))
            }
            Some(Err(err)) => Poll::Ready(Err(err)),
            None => Poll::Pending,
        }
    }
}

/// 每次读都失败。
struct FailingStream;

impl AsyncRead for FailingStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "link reset")))
    }
}

fn reset() -> io::Result<&'static [u8]> {
    Err(io::Error::new(io::ErrorKind::ConnectionReset, "link reset"))
}

#[tokio::test(start_paused = true)]
async fn stable_run_emits_exactly_one_reading() {
    let (registry, binding) = bound(DeviceKind::SmartWeighScale);
    let sink = Arc::new(RecordingSink::new());
    let (mut device, gateway) = tokio::io::duplex(256);
    let session = tokio::spawn(run_session(
        context(&registry, &sink),
        gateway,
        binding,
        driver_for(DeviceKind::SmartWeighScale),
    ));

    device.write_all(b".0600000=").await.expect("write");
    for _ in 0..7 {
        device.write_all(b".0700000=").await.expect("write");
    }
    drop(device);

    let outcome = session.await.expect("session task");
    assert_eq!(outcome, SessionOutcome::ReaderStopped);

    let readings = sink.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].device_id, DEVICE);
    assert_eq!(readings[0].fields, vec![("weight".to_string(), "700000".to_string())]);

    let device = registry.lookup(DEVICE).expect("device");
    assert_eq!(device.state, LifecycleState::Offline);
    assert_eq!(device.last_value.as_deref(), Some("700000"));
    assert!(device.peer.is_none());
}

#[tokio::test(start_paused = true)]
async fn silence_moves_to_no_data_and_next_frame_restores_online() {
    let (registry, binding) = bound(DeviceKind::WeighScale);
    let sink = Arc::new(RecordingSink::new());
    let (mut device, gateway) = tokio::io::duplex(256);
    let session = tokio::spawn(run_session(
        context(&registry, &sink),
        gateway,
        binding,
        driver_for(DeviceKind::WeighScale),
    ));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(
        state(&registry),
        (LifecycleState::Online, CommandStatus::Cooperating)
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        state(&registry),
        (LifecycleState::NoData, CommandStatus::NotResponding)
    );
    assert!(!session.is_finished());

    device.write_all(b".0700000=").await.expect("write");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        state(&registry),
        (LifecycleState::Online, CommandStatus::Cooperating)
    );

    drop(device);
    assert_eq!(session.await.expect("session task"), SessionOutcome::ReaderStopped);
    assert_eq!(state(&registry).0, LifecycleState::Offline);
}

#[tokio::test(start_paused = true)]
async fn exhausted_read_retries_release_binding_once() {
    let (registry, binding) = bound(DeviceKind::WeighScale);
    let lease = binding.lease;
    let sink = Arc::new(RecordingSink::new());

    let outcome = run_session(
        context(&registry, &sink),
        FailingStream,
        binding,
        driver_for(DeviceKind::WeighScale),
    )
    .await;

    assert_eq!(outcome, SessionOutcome::RetriesExhausted);
    let device = registry.lookup(DEVICE).expect("device");
    assert_eq!(device.state, LifecycleState::Offline);
    assert!(device.peer.is_none());
    assert!(!registry.release(&lease));
    assert!(sink.is_empty());
    assert_eq!(registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_frame_resets_failure_count() {
    let (registry, binding) = bound(DeviceKind::WeighScale);
    let sink = Arc::new(RecordingSink::new());
    let stream = ScriptedStream::new(vec![
        reset(),
        reset(),
        reset(),
        Ok(b".0700000="),
        reset(),
        reset(),
        reset(),
    ]);
    let session = tokio::spawn(run_session(
        context(&registry, &sink),
        stream,
        binding,
        driver_for(DeviceKind::WeighScale),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.is_finished());
    assert_eq!(state(&registry).0, LifecycleState::Online);

    // 解除绑定即驱逐当前会话。
    assert!(registry.unbind(DEVICE));
    assert_eq!(session.await.expect("session task"), SessionOutcome::Evicted);
    assert_eq!(state(&registry).0, LifecycleState::Offline);
}

#[tokio::test(start_paused = true)]
async fn rebind_evicts_previous_session() {
    let (registry, binding) = bound(DeviceKind::SmartWeighScale);
    let stale = binding.lease;
    let sink = Arc::new(RecordingSink::new());
    let (_device, gateway) = tokio::io::duplex(64);
    let session = tokio::spawn(run_session(
        context(&registry, &sink),
        gateway,
        binding,
        driver_for(DeviceKind::SmartWeighScale),
    ));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fresh = registry.bind(DEVICE, peer(4001)).expect("rebind");
    assert_eq!(session.await.expect("session task"), SessionOutcome::Evicted);

    // 旧会话退出时的释放不影响新连接。
    let device = registry.lookup(DEVICE).expect("device");
    assert_eq!(device.state, LifecycleState::Online);
    assert_eq!(device.peer, Some(peer(4001)));
    assert!(!registry.release(&stale));
    assert!(registry.release(&fresh.lease));
}

#[tokio::test(start_paused = true)]
async fn decode_error_drops_reading_but_session_continues() {
    let (registry, binding) = bound(DeviceKind::SmartWeighScale);
    let sink = Arc::new(RecordingSink::new());
    let (mut device, gateway) = tokio::io::duplex(512);
    let session = tokio::spawn(run_session(
        context(&registry, &sink),
        gateway,
        binding,
        driver_for(DeviceKind::SmartWeighScale),
    ));

    for _ in 0..7 {
        device.write_all(b".07a0000=").await.expect("write");
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(sink.is_empty());
    assert!(!session.is_finished());

    for _ in 0..7 {
        device.write_all(b".0700000=").await.expect("write");
    }
    drop(device);

    assert_eq!(session.await.expect("session task"), SessionOutcome::ReaderStopped);
    let readings = sink.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].field("weight"), Some("700000"));
}

#[tokio::test(start_paused = true)]
async fn link_monitor_stays_online_without_idle_checks() {
    let (registry, binding) = bound(DeviceKind::RfidReader);
    let sink = Arc::new(RecordingSink::new());
    let (mut device, gateway) = tokio::io::duplex(64);
    let session = tokio::spawn(run_session(
        context(&registry, &sink),
        gateway,
        binding,
        driver_for(DeviceKind::RfidReader),
    ));

    device.write_all(b"card 0012\n").await.expect("write");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        state(&registry),
        (LifecycleState::Online, CommandStatus::Cooperating)
    );

    drop(device);
    assert_eq!(session.await.expect("session task"), SessionOutcome::ReaderStopped);
    assert_eq!(state(&registry).0, LifecycleState::Offline);
    assert!(sink.is_empty());
}
