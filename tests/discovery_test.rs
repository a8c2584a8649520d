//! Network discovery against local fake instruments.

mod common;

use common::{closed_port, FakeInstrument};
use instrument_control::devices::DeviceModel;
use instrument_control::discovery::{DeviceDiscovery, Ipv4Network};
use std::net::Ipv4Addr;
use std::time::Duration;

fn localhost() -> Ipv4Network {
    "127.0.0.1/32".parse().unwrap()
}

#[tokio::test]
async fn test_discovers_local_instrument() {
    let fake = FakeInstrument::start("Keithley Instruments Inc., Model 2636B, 4480001, 3.2.2").await;

    let found = DeviceDiscovery::new(localhost())
        .with_port(fake.port())
        .with_probe_timeout(Duration::from_millis(500))
        .discover()
        .await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].address, Ipv4Addr::LOCALHOST);
    assert_eq!(found[0].port, fake.port());
    assert_eq!(found[0].model, Some(DeviceModel::Kei2600));
    assert!(found[0].identity.starts_with("Keithley"));
    assert_eq!(fake.wait_for(1).await, vec!["*IDN?"]);
}

#[tokio::test]
async fn test_unknown_instrument_has_no_model() {
    let fake = FakeInstrument::start("ACME,Widget 9000,1,0.1").await;
    let found = DeviceDiscovery::new(localhost())
        .with_port(fake.port())
        .discover()
        .await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].model, None);
    assert!(found[0].to_string().contains("ACME,Widget 9000"));
}

#[tokio::test]
async fn test_nothing_listening() {
    let port = closed_port().await;
    let found = DeviceDiscovery::new(localhost())
        .with_port(port)
        .with_probe_timeout(Duration::from_millis(200))
        .discover()
        .await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_error_replies_are_not_instruments() {
    let fake = FakeInstrument::start("-113,\"Undefined header\" Error").await;
    let found = DeviceDiscovery::new(localhost())
        .with_port(fake.port())
        .discover()
        .await;
    assert!(found.is_empty());
    assert_eq!(fake.wait_for(1).await, vec!["*IDN?"]);
}
