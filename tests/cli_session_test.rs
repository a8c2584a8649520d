//! Shell session driving a fake instrument.

mod common;

use common::{FakeInstrument, Reply};
use instrument_control::cli::{CommandLineInterface, Flow, MESSAGE_EXIT, STARTUP_TEXT};
use instrument_control::config::AppConfig;

const GENERATOR_IDN: &str = "Agilent Technologies,33522B,MY52800000,3.05";

fn shell() -> CommandLineInterface<Vec<u8>> {
    let mut config = AppConfig::default();
    config.connection.timeout_ms = 300;
    CommandLineInterface::new(&config, Vec::new())
}

fn text(cli: &CommandLineInterface<Vec<u8>>) -> String {
    String::from_utf8_lossy(cli.output()).into_owned()
}

#[tokio::test]
async fn test_connect_and_send_commands() {
    let fake = FakeInstrument::with_replies(
        GENERATOR_IDN,
        vec![("SOURce1:FREQuency?", Reply::Line("+1.0E+03".to_string()))],
    )
    .await;
    let mut cli = shell();

    cli.execute_line(&format!("connect 127.0.0.1:{}", fake.port()))
        .await
        .unwrap();
    cli.execute_line("select_device 0").await.unwrap();
    cli.execute_line("custom_command SOURce1:FREQuency 1000").await.unwrap();
    cli.execute_line("custom_command 0 SOURce1:FREQuency?").await.unwrap();
    cli.execute_line("active_devices").await.unwrap();

    let output = text(&cli);
    assert!(output.contains(&format!("    Connect to device IP: 127.0.0.1:{} ID (0)", fake.port())));
    assert!(output.contains(&format!("    Device identified as {GENERATOR_IDN}")));
    assert!(output.contains("    Command executed"));
    assert!(output.contains("    Returns: +1.0E+03"));
    assert!(output.contains("Connected (selected)"));

    assert_eq!(cli.execute_line("quit").await.unwrap(), Flow::Exit);
    assert!(text(&cli).contains("    Device 0 closed successfully"));
    assert_eq!(
        fake.wait_for(3).await,
        vec!["*IDN?", "SOURce1:FREQuency 1000", "SOURce1:FREQuency?"]
    );
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let port = common::closed_port().await;
    let mut cli = shell();
    cli.execute_line(&format!("connect 127.0.0.1:{port}")).await.unwrap();
    assert!(text(&cli).starts_with("    Error: "));
    assert!(cli.session().is_empty());
}

#[tokio::test]
async fn test_scripted_session() {
    let fake = FakeInstrument::start(GENERATOR_IDN).await;
    let mut cli = shell();
    let script = format!(
        "connect 127.0.0.1:{}\nget_device_identity 0\ndiscover 127.0.0.1/32 {}\n",
        fake.port(),
        fake.port()
    );

    cli.run(script.as_bytes(), std::future::pending()).await.unwrap();

    let output = text(&cli);
    assert!(output.starts_with(STARTUP_TEXT));
    assert!(output.contains(&format!("    Device identity: {GENERATOR_IDN}")));
    assert!(output.contains("    Found 1 device(s)"));
    assert!(output.contains("[kst33500]"));
    assert!(output.contains("    Device 0 closed successfully"));
    assert!(output.ends_with(&format!("{MESSAGE_EXIT}\n")));
}
