//! Loading the service configuration from disk.

use std::io::Write;
use std::time::Duration;

use binlog_sync::config::MetaConfig;
use binlog_sync::Config;
use meta_store::{MemoryMetaStore, MetaStore};

const CONFIG: &str = r#"
server:
  host: 127.0.0.1
  port: 9090
meta:
  kind: memory
  tasks:
    - title: orders replication
      src:
        host: source.local
        username: repl
      destinations:
        - name: replica
          config:
            destDatasource:
              host: dest.local
              username: writer
            mappings:
              - srcTable: orders
checkpoint:
  tick: 500ms
  interval: 10s
sink:
  max_connections: 2
  write_timeout: 3s
"#;

#[tokio::test]
async fn test_memory_config_seeds_tasks() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.server.bind_address(), "127.0.0.1:9090");
    assert_eq!(config.checkpoint.tick, Duration::from_millis(500));
    assert_eq!(config.checkpoint.interval, Duration::from_secs(10));
    assert_eq!(config.sink.pool_settings().max_connections, 2);
    assert_eq!(config.sink.pool_settings().write_timeout, Some(Duration::from_secs(3)));

    let MetaConfig::Memory { tasks } = config.meta else {
        panic!("expected memory meta store");
    };
    let store = MemoryMetaStore::seeded(tasks).await.unwrap();
    let listed = store.list_tasks(1, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "orders replication");
    let destinations = store.get_destinations(&listed[0]).await.unwrap();
    assert_eq!(destinations[0].name, "replica");
}

#[test]
fn test_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = Config::from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yaml"));
}

#[test]
fn test_interval_shorter_than_tick_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"checkpoint:\n  tick: 10s\n  interval: 1s\n").unwrap();
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("checkpoint.interval"));
}
