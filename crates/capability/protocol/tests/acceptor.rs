use domain::{CatalogEntry, DeviceId, DeviceKind, LifecycleState};
use fieldgw_protocol::{AcceptorConfig, ConnectionAcceptor, SessionConfig, SessionContext};
use fieldgw_registry::DeviceRegistry;
use fieldgw_report::RecordingSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn acceptor(registry: &Arc<DeviceRegistry>, sink: &Arc<RecordingSink>) -> ConnectionAcceptor {
    let ctx = SessionContext::new(registry.clone(), sink.clone(), SessionConfig::default());
    ConnectionAcceptor::new(
        ctx,
        AcceptorConfig {
            listen_host: "127.0.0.1".to_string(),
            ..AcceptorConfig::default()
        },
    )
}

fn register(registry: &DeviceRegistry, id: u64, code: &str) -> DeviceKind {
    let kind = DeviceKind::from_code(code).expect("kind");
    registry.register(
        &CatalogEntry {
            id: DeviceId(id),
            port: 0,
            code: code.to_string(),
        },
        kind,
    );
    kind
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn accepted_connection_runs_scale_session() {
    let registry = Arc::new(DeviceRegistry::new());
    let sink = Arc::new(RecordingSink::new());
    let kind = register(&registry, 1, "ZNDIBANG-001");
    let acceptor = acceptor(&registry, &sink);

    let listener = acceptor.listen(0).await.expect("listen");
    let addr = listener.local_addr().expect("local addr");
    let server = {
        let acceptor = acceptor.clone();
        tokio::spawn(async move { acceptor.serve(listener, DeviceId(1), kind).await })
    };

    let mut client = TcpStream::connect(addr).await.expect("connect");
    wait_until(|| registry.lookup(DeviceId(1)).is_some_and(|d| d.is_bound())).await;
    assert_eq!(
        registry.lookup(DeviceId(1)).expect("device").state,
        LifecycleState::Online
    );

    client.write_all(b".0600000=").await.expect("write");
    for _ in 0..7 {
        client.write_all(b".0700000=").await.expect("write");
    }
    wait_until(|| sink.readings().len() == 1).await;
    assert_eq!(sink.readings()[0].field("weight"), Some("700000"));

    drop(client);
    wait_until(|| {
        registry.lookup(DeviceId(1)).expect("device").state == LifecycleState::Offline
    })
    .await;
    assert!(!server.is_finished());
    server.abort();
}

#[tokio::test]
async fn connection_for_unknown_device_is_dropped() {
    let registry = Arc::new(DeviceRegistry::new());
    let sink = Arc::new(RecordingSink::new());
    let acceptor = acceptor(&registry, &sink);

    let listener = acceptor.listen(0).await.expect("listen");
    let addr = listener.local_addr().expect("local addr");
    let server = {
        let acceptor = acceptor.clone();
        tokio::spawn(async move { acceptor.serve(listener, DeviceId(42), DeviceKind::WeighScale).await })
    };

    let mut client = TcpStream::connect(addr).await.expect("connect");
    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("closed in time")
        .unwrap_or(0);
    assert_eq!(n, 0);
    assert!(registry.is_empty());
    server.abort();
}

#[tokio::test]
async fn occupied_port_ends_acceptor_task() {
    let registry = Arc::new(DeviceRegistry::new());
    let sink = Arc::new(RecordingSink::new());
    let kind = register(&registry, 3, "DIBANG-003");
    let acceptor = acceptor(&registry, &sink);

    let holder = acceptor.listen(0).await.expect("listen");
    let port = holder.local_addr().expect("local addr").port();

    let handle = acceptor.spawn(DeviceId(3), port, kind);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("acceptor exits")
        .expect("acceptor task");
    assert_eq!(
        registry.lookup(DeviceId(3)).expect("device").state,
        LifecycleState::Offline
    );
}
