//! Drivers talking to a fake instrument over a real TCP socket.

mod common;

use common::{closed_port, FakeInstrument, Reply};
use instrument_control::device::{Device, DeviceConfig, Instrument};
use instrument_control::devices::capabilities::{DcPowerSupply, Oscilloscope};
use instrument_control::devices::types::{DcChannel, OscChannel, TriggerEdge};
use instrument_control::devices::{Kst3000, Spd1305};
use instrument_control::InstrumentError;
use std::time::Duration;

const SCOPE_IDN: &str = "KEYSIGHT TECHNOLOGIES,DSO-X 3024T,MY58000000,07.20";
const SUPPLY_IDN: &str = "Siglent Technologies,SPD1305X,SPD13DCC000000,1.01";

fn config(fake: &FakeInstrument) -> DeviceConfig {
    DeviceConfig::new("127.0.0.1")
        .with_port(fake.port())
        .with_timeout(Duration::from_millis(300))
}

#[tokio::test]
async fn test_connect_identify_disconnect() {
    let fake = FakeInstrument::start(SUPPLY_IDN).await;
    let mut device = Device::new(config(&fake));

    device.connect().await.unwrap();
    assert!(device.is_open());
    assert_eq!(device.identify().await.unwrap(), SUPPLY_IDN);

    device.disconnect().await.unwrap();
    assert!(!device.is_open());
    assert!(matches!(
        device.disconnect().await,
        Err(InstrumentError::InterfaceClosed)
    ));
}

#[tokio::test]
async fn test_connect_refused_is_recorded() {
    let port = closed_port().await;
    let mut device = Device::new(
        DeviceConfig::new("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_millis(300)),
    );
    assert!(device.connect().await.is_err());
    assert!(device.last_error_message().is_some());
    assert!(matches!(
        device.exec_str("*RST").await,
        Err(InstrumentError::InterfaceClosed)
    ));
}

#[tokio::test]
async fn test_unanswered_query_times_out() {
    let fake = FakeInstrument::start(SUPPLY_IDN).await;
    let mut device = Device::new(config(&fake));
    device.connect().await.unwrap();

    let err = device.query_str("SYSTem:ERRor?").await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(device.is_open());
}

#[tokio::test]
async fn test_hangup_closes_interface() {
    let fake = FakeInstrument::with_replies(SUPPLY_IDN, vec![("BYE?", Reply::Hangup)]).await;
    let mut device = Device::new(config(&fake));
    device.connect().await.unwrap();

    let err = device.query_str("BYE?").await.unwrap_err();
    assert!(err.is_connection_lost(), "{err}");
    assert!(!device.is_open());
}

#[tokio::test]
async fn test_power_supply_over_tcp() {
    let fake = FakeInstrument::with_replies(
        SUPPLY_IDN,
        vec![("CH1:VOLTage?", Reply::Line("3.300".to_string()))],
    )
    .await;
    let mut supply = Spd1305::new(config(&fake));
    supply.device_mut().connect().await.unwrap();

    supply.set_voltage(DcChannel::Ch1, 3.3).await.unwrap();
    supply.turn_on(DcChannel::Ch1).await.unwrap();
    assert_eq!(supply.voltage(DcChannel::Ch1).await.unwrap(), 3.3);
    supply.device_mut().disconnect().await.unwrap();

    assert_eq!(
        fake.wait_for(3).await,
        vec!["CH1:VOLTage 3.3", "OUTPut CH1,ON", "CH1:VOLTage?"]
    );
}

#[tokio::test]
async fn test_oscilloscope_waveform_over_tcp() {
    let fake = FakeInstrument::with_replies(
        SCOPE_IDN,
        vec![
            (
                "WAVeform:PREamble?",
                Reply::Line("+0,+0,+3,+1,+1.0E-03,+0.0E+00,+0,+5.0E-01,+0.0E+00,+100".to_string()),
            ),
            ("WAVeform:DATA?", Reply::Block(vec![100, 0, 102])),
            ("*OPC?", Reply::Line("1".to_string())),
        ],
    )
    .await;
    let mut scope = Kst3000::new(config(&fake));
    scope.device_mut().connect().await.unwrap();

    scope.set_trigger_edge(TriggerEdge::Positive).await.unwrap();
    scope.set_waveform_source(OscChannel::C1).await.unwrap();
    let samples = scope.real_data().await.unwrap();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].voltage, Some(0.0));
    assert_eq!(samples[1].voltage, None);
    assert_eq!(samples[2].voltage, Some(1.0));
    assert!((samples[2].time - 0.002).abs() < 1e-12);

    // the block terminator must not leak into the next response
    assert_eq!(scope.device_mut().query_str("*OPC?").await.unwrap(), "1");
}
