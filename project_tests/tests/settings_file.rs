use std::io::Write;

use lib_telemetry::configs::{ConfigError, PipelineSettings};
use lib_telemetry::core::StoreOptions;
use servers::pipeline::config::{CommonArgs, log_options};

fn settings_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn file_then_flags() {
    let file = settings_file(
        r#"{
            "redis": {"url": "redis://cache:6379/"},
            "amqp": {"queue": "telemetry", "prefetch": 4},
            "storage": {"ttlSecs": 3600, "notifyBuffer": 32},
            "recipients": [
                {"id": "User1", "sinkUrl": "http://user1:8082/data"},
                {"id": "User2", "sinkUrl": "http://user2:8083/data"}
            ],
            "logging": {"level": "debug"}
        }"#,
    );

    let args = CommonArgs {
        config: Some(file.path().to_path_buf()),
        queue: Some("override".into()),
        ..CommonArgs::default()
    };
    let settings = args.resolve().unwrap();

    assert_eq!(settings.redis.url, "redis://cache:6379/");
    assert_eq!(settings.amqp.queue, "override");
    assert_eq!(settings.amqp.prefetch, 4);
    assert_eq!(settings.distributor.queue_capacity, 100);

    let options = StoreOptions::from(&settings.storage);
    assert_eq!(options.ttl.as_secs(), 3600);
    assert_eq!(options.notify_buffer, 32);
    assert_eq!(log_options(&settings.logging).level, "debug");

    let registry = settings.registry().unwrap();
    let sinks: Vec<String> = registry
        .routes()
        .filter_map(|(_, route)| route.sink_url.as_ref().map(|u| u.to_string()))
        .collect();
    assert_eq!(sinks, vec!["http://user1:8082/data", "http://user2:8083/data"]);
}

#[test]
fn broken_files_are_reported() {
    let garbage = settings_file("{ not json");
    assert!(matches!(
        PipelineSettings::from_file(garbage.path()),
        Err(ConfigError::Parse { .. })
    ));

    let empty_recipients = settings_file(r#"{"recipients": []}"#);
    assert!(matches!(
        PipelineSettings::from_file(empty_recipients.path()),
        Err(ConfigError::Invalid(_))
    ));
}
