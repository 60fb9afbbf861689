use rustx_conf::cfg::{new_dynamic, ConfigError, Loader, LoaderConfig, NopLogger};
use rustx_conf::fs::FileWatcherConfig;
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
struct DatabaseConfig {
    host: String,
    port: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
struct GlobalConfig {
    #[serde(rename = "HTTPListener")]
    http_listener: String,
    #[serde(rename = "databaseConfig")]
    database_config: DatabaseConfig,
}

fn fast_watcher() -> FileWatcherConfig {
    FileWatcherConfig {
        worker_threads: 1,
        debounce_delay_ms: 100,
    }
}

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn watched_loader(path: &Path) -> Loader<DatabaseConfig> {
    Loader::<DatabaseConfig>::builder()
        .config_file(path)
        .disable_automatic_env()
        .logger(Arc::new(NopLogger))
        .watcher_config(fast_watcher())
        .build()
}

/// 轮询直到条件成立或超时
fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

#[test]
fn test_load_json_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"localhost","port":5432}"#);

    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .disable_automatic_env()
        .build();

    assert_eq!(loader.load().host, "localhost");
    assert_eq!(loader.load().port, 5432);
}

#[test]
fn test_all_formats_decode_the_same() {
    let dir = TempDir::new().unwrap();
    let files = [
        ("config.json", r#"{"host": "localhost", "port": 5432}"#),
        ("config.json5", "{host: 'localhost', port: 5432, /* json5 */}"),
        ("config.yaml", "host: localhost\nport: 5432\n"),
        ("config.toml", "host = \"localhost\"\nport = 5432\n"),
    ];

    for (name, content) in files {
        let path = write_config(&dir, name, content);
        let loader = Loader::<DatabaseConfig>::builder()
            .config_file(&path)
            .disable_automatic_env()
            .build();
        assert_eq!(
            *loader.load(),
            DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432
            },
            "格式 {} 解析结果不一致",
            name
        );
    }
}

#[test]
fn test_sub_section() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.json",
        r#"{"databaseConfig":{"host":"localhost"}}"#,
    );

    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .sub_section("databaseConfig")
        .disable_automatic_env()
        .build();
    assert_eq!(loader.load().host, "localhost");
    assert_eq!(loader.load().port, 0, "子配置缺少的字段使用默认值");

    let path = write_config(&dir, "other.json", r#"{"cache":{"host":"localhost"}}"#);
    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .sub_section("databaseConfig")
        .disable_automatic_env()
        .disable_auto_parse()
        .build();

    let err = loader.parse().unwrap_err();
    assert!(matches!(err, ConfigError::SectionNotFound { .. }));
    assert!(err.to_string().contains("databaseConfig"));
}

#[test]
#[serial]
fn test_env_overlay_fills_missing_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.json",
        r#"{"HTTPListener": "0.0.0.0:8888", "databaseConfig": {"port": 5432}}"#,
    );

    std::env::set_var("DATABASECONFIG_HOST", "example.com");
    let loader = Loader::<GlobalConfig>::builder().config_file(&path).build();
    std::env::remove_var("DATABASECONFIG_HOST");

    let config = loader.load();
    assert_eq!(config.database_config.host, "example.com");
    assert_eq!(config.database_config.port, 5432);
    assert_eq!(config.http_listener, "0.0.0.0:8888");
}

#[test]
#[serial]
fn test_env_overlay_disabled() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.json",
        r#"{"databaseConfig": {"host": "localhost", "port": 5432}}"#,
    );

    std::env::set_var("DATABASECONFIG_HOST", "example.com");
    let with_env = Loader::<GlobalConfig>::builder().config_file(&path).build();
    let without_env = Loader::<GlobalConfig>::builder()
        .config_file(&path)
        .disable_automatic_env()
        .build();
    std::env::remove_var("DATABASECONFIG_HOST");

    assert_eq!(with_env.load().database_config.host, "example.com");
    assert_eq!(without_env.load().database_config.host, "localhost");
}

#[test]
#[serial]
fn test_default_config_file_in_working_directory() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "config.yml", "host: from-cwd\nport: 1\n");

    let cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let result = Loader::<DatabaseConfig>::try_new(LoaderConfig {
        disable_automatic_env: true,
        ..Default::default()
    });
    std::env::set_current_dir(cwd).unwrap();

    assert_eq!(result.unwrap().load().host, "from-cwd");
}

#[test]
fn test_default_fallback() {
    let fallback = DatabaseConfig {
        host: "fallback".to_string(),
        port: 1,
    };

    let loader = Loader::<DatabaseConfig>::builder()
        .config_file("/nonexistent/rustx-conf/config.yml")
        .disable_automatic_env()
        .default(fallback.clone())
        .build();

    assert_eq!(*loader.load(), fallback);
}

#[test]
#[should_panic(expected = "Failed to load config")]
fn test_missing_file_without_default_panics() {
    Loader::<DatabaseConfig>::builder()
        .config_file("/nonexistent/rustx-conf/config.yml")
        .disable_automatic_env()
        .build();
}

#[test]
fn test_disable_auto_parse_requires_parse() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"localhost","port":5432}"#);

    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .disable_automatic_env()
        .disable_auto_parse()
        .build();
    assert!(loader.try_load().is_none());

    loader.parse().unwrap();
    assert_eq!(loader.load().port, 5432);
}

#[test]
fn test_reload_on_file_change() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"localhost","port":5432}"#);

    let loader = watched_loader(&path);
    let dynamic = loader.start_watcher();
    assert!(loader.is_watching());

    thread::sleep(Duration::from_millis(200));
    fs::write(&path, r#"{"host":"db.internal","port":5433}"#).unwrap();

    assert!(
        wait_until(Duration::from_secs(3), || dynamic.load().host == "db.internal"),
        "文件修改后应该重新加载"
    );
    assert_eq!(dynamic.load().port, 5433);
}

#[test]
fn test_start_watcher_twice_notifies_once_per_change() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"localhost","port":5432}"#);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .disable_automatic_env()
        .logger(Arc::new(NopLogger))
        .watcher_config(fast_watcher())
        .on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let first = loader.start_watcher();
    let second = loader.start_dynamic_reload();

    thread::sleep(Duration::from_millis(200));
    fs::write(&path, r#"{"host":"changed","port":5432}"#).unwrap();

    assert!(wait_until(Duration::from_secs(3), || calls.load(Ordering::SeqCst) >= 1));
    thread::sleep(Duration::from_millis(500));

    assert_eq!(calls.load(Ordering::SeqCst), 1, "一次修改只应该通知一次");
    assert_eq!(first.load().host, "changed");
    assert_eq!(second.load().host, "changed");
}

#[test]
fn test_reload_failure_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"localhost","port":5432}"#);

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let loader = watched_loader(&path);
    let dynamic = loader.start_watcher();

    let recorded = errors.clone();
    dynamic.set_on_change_func(move |err| {
        if let Some(e) = err {
            recorded.lock().unwrap().push(e.to_string());
        }
    });

    thread::sleep(Duration::from_millis(200));
    fs::write(&path, r#"{"host":"localhost","port":"not-a-port"}"#).unwrap();

    assert!(wait_until(Duration::from_secs(3), || !errors
        .lock()
        .unwrap()
        .is_empty()));
    assert!(errors.lock().unwrap()[0].starts_with("failed to unmarshal config"));
    assert_eq!(dynamic.load().port, 5432, "重新加载失败时保留旧配置");
}

#[test]
fn test_missing_field_without_env_parses_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.yml", "host: localhost\n");

    let fallback = DatabaseConfig {
        host: "fallback".to_string(),
        port: 1,
    };
    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .disable_automatic_env()
        .default(fallback)
        .build();

    assert_eq!(
        *loader.load(),
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 0,
        },
        "解析成功时不应该使用兜底配置"
    );
}

#[test]
fn test_rename_away_keeps_snapshot_without_callback() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"localhost","port":5432}"#);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let loader = Loader::<DatabaseConfig>::builder()
        .config_file(&path)
        .disable_automatic_env()
        .logger(Arc::new(NopLogger))
        .watcher_config(fast_watcher())
        .on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let dynamic = loader.start_watcher();

    thread::sleep(Duration::from_millis(200));
    fs::rename(&path, dir.path().join("config.bak")).unwrap();
    thread::sleep(Duration::from_millis(600));

    assert_eq!(calls.load(Ordering::SeqCst), 0, "文件被移走不应该触发重新加载");
    assert_eq!(dynamic.load().host, "localhost");

    fs::write(&path, r#"{"host":"restored","port":5432}"#).unwrap();
    assert!(wait_until(Duration::from_secs(3), || calls.load(Ordering::SeqCst) >= 1));
    assert_eq!(dynamic.load().host, "restored");
}

#[test]
fn test_new_dynamic() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.yaml", "host: localhost\nport: 5432\n");

    let (dynamic, first) = new_dynamic(
        Loader::<DatabaseConfig>::builder()
            .config_file(&path)
            .disable_automatic_env()
            .logger(Arc::new(NopLogger))
            .watcher_config(fast_watcher()),
    );

    assert_eq!(first.host, "localhost");
    assert!(dynamic.loader().is_watching());

    thread::sleep(Duration::from_millis(200));
    fs::write(&path, "host: db.internal\nport: 5432\n").unwrap();

    assert!(wait_until(Duration::from_secs(3), || dynamic.load().host == "db.internal"));
    assert_eq!(first.host, "localhost", "首次读取的值不受后续重新加载影响");
}

#[test]
fn test_concurrent_load_during_reparse() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"host":"h0","port":0}"#);

    let loader = watched_loader(&path);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let loader = loader.clone();
            let done = done.clone();
            thread::spawn(move || loop {
                let config = loader.load();
                assert_eq!(config.host, format!("h{}", config.port), "读到了不一致的配置");
                if done.load(Ordering::Acquire) {
                    break;
                }
            })
        })
        .collect();

    for i in 1..=200u16 {
        fs::write(&path, format!(r#"{{"host":"h{}","port":{}}}"#, i, i)).unwrap();
        loader.parse().unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(loader.load().port, 200);
}
