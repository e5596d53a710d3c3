use fizzq::config::Config;
use std::time::Duration;

const VARS: &[&str] = &[
    "FIZZQ_BIND",
    "FIZZQ_TOPIC",
    "FIZZQ_PARTITIONS",
    "FIZZQ_GROUP",
    "FIZZQ_WORKERS",
    "FIZZQ_RETRY_DELAY_MS",
    "FIZZQ_RETRY_CAP",
    "FIZZQ_RETRY_AFTER_MS",
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
];

fn clear() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// Environment is process-global, so every case runs in one test.
#[test]
fn config_from_env() {
    clear();
    let config = Config::from_env().unwrap();
    assert_eq!(config.bind.to_string(), "127.0.0.1:8080");
    assert_eq!(config.topic, "raw-input");
    assert_eq!(config.partitions, 3);
    assert_eq!(config.group_id, "fizz-buzz-worker");
    assert_eq!(config.workers, 2);
    assert_eq!(config.retry_delay, Duration::from_secs(1));
    assert_eq!(config.retry_cap, None);
    assert!(config.otel_endpoint.is_none());
    assert_eq!(config.log_level, "info");

    let worker = config.worker();
    assert_eq!(worker.topic, "raw-input");
    assert_eq!(worker.retry.max_consecutive, None);

    unsafe {
        std::env::set_var("FIZZQ_BIND", "0.0.0.0:9000");
        std::env::set_var("FIZZQ_TOPIC", "numbers");
        std::env::set_var("FIZZQ_PARTITIONS", "8");
        std::env::set_var("FIZZQ_RETRY_DELAY_MS", "250");
        std::env::set_var("FIZZQ_RETRY_CAP", "5");
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.bind.port(), 9000);
    assert_eq!(config.topic, "numbers");
    assert_eq!(config.partitions, 8);
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    let worker = config.worker();
    assert_eq!(worker.topic, "numbers");
    assert_eq!(worker.retry.delay, Duration::from_millis(250));
    assert_eq!(worker.retry.max_consecutive, Some(5));

    unsafe { std::env::set_var("FIZZQ_PARTITIONS", "many") };
    assert!(Config::from_env().is_err());

    unsafe { std::env::set_var("FIZZQ_PARTITIONS", "0") };
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("FIZZQ_PARTITIONS", "1");
        std::env::set_var("FIZZQ_WORKERS", "0");
    }
    assert!(Config::from_env().is_err());

    clear();
}
