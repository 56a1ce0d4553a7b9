#[path = "../src/option.rs"]
mod option;

use option::{ConfigError, ReconnectOpts, TrackerOption};

#[test]
fn minimal_config_gets_defaults() {
    let opts = TrackerOption::from_json(r#"{"url": "ws://127.0.0.1:9000/rides"}"#).unwrap();
    assert_eq!(opts, TrackerOption::new("ws://127.0.0.1:9000/rides"));
    assert_eq!(opts.log_level, "info");
    assert_eq!(opts.history_limit, 100);
    assert_eq!(opts.ride_id, None);
    assert_eq!(
        opts.reconnect,
        ReconnectOpts {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 500,
        }
    );
    opts.validate().unwrap();
}

#[test]
fn full_config_uses_camel_case() {
    let opts = TrackerOption::from_json(
        r#"{
            "url": "wss://rides.example.com/ws",
            "logLevel": "debug",
            "historyLimit": 20,
            "rideId": "r1",
            "reconnect": { "enabled": false, "maxAttempts": 2 }
        }"#,
    )
    .unwrap();
    assert_eq!(opts.log_level, "debug");
    assert_eq!(opts.history_limit, 20);
    assert_eq!(opts.ride_id.as_deref(), Some("r1"));
    assert!(!opts.reconnect.enabled);
    assert_eq!(opts.reconnect.max_attempts, 2);
    assert_eq!(opts.reconnect.initial_delay_ms, 500);
}

#[test]
fn missing_url_fails_to_parse() {
    assert!(matches!(TrackerOption::from_json(r#"{"logLevel": "warn"}"#), Err(ConfigError::Json(_))));
}

#[test]
fn validate_rejects_bad_urls() {
    let not_a_url = TrackerOption::new("rides");
    assert!(matches!(not_a_url.validate(), Err(ConfigError::InvalidUrl { .. })));

    let http = TrackerOption::new("http://rides.example.com");
    match http.validate() {
        Err(ConfigError::UnsupportedScheme(scheme)) => assert_eq!(scheme, "http"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn load_reports_missing_file() {
    let result = TrackerOption::load("/nonexistent/ridebus.json");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
