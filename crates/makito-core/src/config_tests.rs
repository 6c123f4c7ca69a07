use std::time::Duration;

use crate::config::{ConfigError, ConnectionConfig};

fn device(host: &str, port: u16) -> ConnectionConfig {
    ConnectionConfig {
        host: host.to_string(),
        port,
        ..ConnectionConfig::default()
    }
}

#[test]
fn https_only_on_443() {
    assert_eq!(device("10.0.0.5", 443).base_url(), "https://10.0.0.5:443");
    assert_eq!(device(" 10.0.0.5 ", 8080).base_url(), "http://10.0.0.5:8080");
}

#[test]
fn blank_host_is_rejected() {
    assert_eq!(device("   ", 443).validate(), Err(ConfigError::NoHost));
}

#[test]
fn poll_interval_must_be_within_a_minute() {
    // Arrange
    let mut config = device("10.0.0.5", 443);

    // Act
    config.poll_interval = Duration::from_secs(61);
    let too_slow = config.validate();
    config.poll_interval = Duration::from_millis(500);
    let too_fast = config.validate();
    config.poll_interval = Duration::from_secs(60);
    let edge = config.validate();

    // Assert
    assert_eq!(too_slow, Err(ConfigError::IntervalOutOfRange(61)));
    assert_eq!(too_fast, Err(ConfigError::IntervalOutOfRange(0)));
    assert_eq!(edge, Ok(()));
}
