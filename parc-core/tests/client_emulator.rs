//! End-to-end tests: real client against the emulator over loopback.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parc_core::client::{ClientConfig, ReceiverClient, TcpConnector, TcpTransport};
use parc_core::client::{Connector, ReconnectTransport, Transport};
use parc_core::emulator::{Emulator, EmulatorOptions};
use parc_core::error::ParcError;

fn loopback_options() -> EmulatorOptions {
    EmulatorOptions {
        bind: "127.0.0.1:0".parse().unwrap(),
        warmup_time: Duration::from_millis(200),
        cooldown_time: Duration::from_millis(200),
        ..EmulatorOptions::default()
    }
}

fn test_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::default()
        .with_host(format!("127.0.0.1:{}", addr.port()))
        .with_timeout(Duration::from_millis(500))
}

async fn connect_client(emulator: &Emulator, config: &ClientConfig) -> ReceiverClient {
    let addr = emulator.local_addr();
    let transport = TcpTransport::connect("127.0.0.1", addr.port(), config)
        .await
        .unwrap();
    ReceiverClient::from_transport(transport, config.clone()).unwrap()
}

#[tokio::test]
async fn query_power_status() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    assert_eq!(client.power_status().await.unwrap(), "Standby");
}

#[tokio::test]
async fn password_handshake_accepted() {
    let mut options = loopback_options();
    options.password = Some("secret".to_string());
    let emulator = Emulator::start(options).await.unwrap();

    let config = test_config(emulator.local_addr()).with_password(Some("secret".to_string()));
    let client = connect_client(&emulator, &config).await;
    assert_eq!(client.power_status().await.unwrap(), "Standby");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let mut options = loopback_options();
    options.password = Some("secret".to_string());
    let emulator = Emulator::start(options).await.unwrap();
    let addr = emulator.local_addr();

    // Same length as the real password so the emulator can judge it
    // as soon as it arrives.
    let config = test_config(addr).with_password(Some("zecret".to_string()));
    let err = TcpTransport::connect("127.0.0.1", addr.port(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ParcError::AuthenticationRejected));
}

#[tokio::test]
async fn power_on_sequence_completes() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    let status = client.power_on_wait(true).await.unwrap();
    assert_eq!(status, "On");
    assert_eq!(client.power_status().await.unwrap(), "On");

    let status = client.power_off_wait(true).await.unwrap();
    assert_eq!(status, "Standby");
}

#[tokio::test]
async fn power_on_while_on_gets_no_response_and_kills_transport() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    emulator.set_power_status("On").unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    // Real receivers stay silent on power.on unless in Standby; the
    // transport treats the read timeout as fatal.
    let err = client.power_on().await.unwrap_err();
    assert!(matches!(err, ParcError::Shared(_)));
    assert!(client.transport().is_shut_down());

    // Later callers observe the stored reason.
    let err = client.power_status().await.unwrap_err();
    assert!(matches!(err, ParcError::Shared(_)));
}

#[tokio::test]
async fn set_input_updates_status() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    assert_eq!(client.input_status().await.unwrap(), "HDMI 1");
    client.set_input("hdmi_2").await.unwrap();
    assert_eq!(client.input_status().await.unwrap(), "HDMI 2");
}

#[tokio::test]
async fn model_is_learned_from_first_model_query() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    assert!(client.model().is_none());
    let names = client.model_status().await.unwrap();
    assert_eq!(names, "DLA-NZ8,DLA-RS3100,DLA-NX7");
    assert_eq!(client.model().unwrap().name, "DLA-NZ8");
}

#[tokio::test]
async fn firmware_version_is_friendly() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    assert_eq!(client.firmware_version().await.unwrap(), "3.010");
}

#[tokio::test]
async fn multi_transact_preserves_partial_responses() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    emulator.set_power_status("On").unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    // power.on while already On gets no response, so the batch stops
    // there with the first query's response intact.
    let outcome = client
        .multi_transact(&["power_status.query", "power.on"])
        .await
        .unwrap();
    assert_eq!(outcome.responses.len(), 1);
    assert_eq!(outcome.responses[0].response_str().unwrap(), "On");
    assert!(outcome.error.is_some());
    assert!(matches!(
        outcome.into_result(),
        Err(ParcError::Shared(_))
    ));
}

#[tokio::test]
async fn reconnect_transport_survives_idle_disconnect() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let addr = emulator.local_addr();
    let config = test_config(addr).with_idle_disconnect(Duration::from_millis(200));

    let connector: Arc<dyn Connector> = Arc::new(TcpConnector::new(
        "127.0.0.1",
        addr.port(),
        config.clone(),
    ));
    let transport = ReconnectTransport::new(connector, config.idle_disconnect());
    let client = ReceiverClient::from_transport(transport, config).unwrap();

    assert_eq!(client.power_status().await.unwrap(), "Standby");
    // Give the idle task time to drop the connection, then transact
    // again over a fresh dial.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(client.power_status().await.unwrap(), "Standby");
}

/// Counts dials so tests can see when the inner connection is
/// replaced.
struct CountingConnector {
    inner: TcpConnector,
    connects: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait::async_trait]
impl Connector for CountingConnector {
    async fn connect(&self) -> parc_core::error::Result<Arc<dyn Transport>> {
        self.connects
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.connect().await
    }
}

#[tokio::test]
async fn activity_postpones_idle_disconnect() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let addr = emulator.local_addr();
    let config = test_config(addr).with_idle_disconnect(Duration::from_millis(500));

    let connects = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let connector: Arc<dyn Connector> = Arc::new(CountingConnector {
        inner: TcpConnector::new("127.0.0.1", addr.port(), config.clone()),
        connects: connects.clone(),
    });
    let transport = ReconnectTransport::new(connector, config.idle_disconnect());
    let client = ReceiverClient::from_transport(transport, config).unwrap();

    // Keep transacting inside the idle window: each exchange restarts
    // the timer, so the inner connection must survive untouched even
    // though the total elapsed time far exceeds the window.
    for _ in 0..4 {
        assert_eq!(client.power_status().await.unwrap(), "Standby");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(connects.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Now go quiet past the window: exactly one inner shutdown, and
    // the next transaction dials exactly once more.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(client.power_status().await.unwrap(), "Standby");
    assert_eq!(connects.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn emulator_shutdown_releases_the_listener() {
    let mut emulator = Emulator::start(loopback_options()).await.unwrap();
    let addr = emulator.local_addr();
    emulator.shut_down().await;

    // The accept task has been awaited, so the port is free again.
    let rebound = tokio::net::TcpListener::bind(addr).await.unwrap();
    assert_eq!(rebound.local_addr().unwrap(), addr);
}

#[tokio::test]
async fn transactions_are_serialized() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    let config = test_config(emulator.local_addr());
    let client = Arc::new(connect_client(&emulator, &config).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.power_status().await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "Standby");
    }
}

#[tokio::test]
async fn emergency_state_fails_power_on() {
    let emulator = Emulator::start(loopback_options()).await.unwrap();
    emulator.set_power_status("Emergency").unwrap();
    let config = test_config(emulator.local_addr());
    let client = connect_client(&emulator, &config).await;

    let err = client.power_on_wait(true).await.unwrap_err();
    assert!(matches!(err, ParcError::Other(_)));
}
