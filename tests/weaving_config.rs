use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use weaving_inspect::config::WeavingConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WEAVING_CONFIG",
        "WEAVING_SERVER_URL",
        "WEAVING_PICTURES_DIR",
        "WEAVING_SAMPLE_RATE_HZ",
        "WEAVING_CYCLE_PERIOD_MS",
        "WEAVING_LOG_FILE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = WeavingConfig::load().expect("load config");
    assert_eq!(cfg.server_url, "http://127.0.0.1:5000");
    assert_eq!(cfg.pictures.dir, PathBuf::from("pictures"));
    assert_eq!(cfg.sampling.rate_hz, 50.0);
    assert_eq!(cfg.surface.cycle_period, Duration::from_secs(2));
    assert_eq!(cfg.displacement_threshold_cm(), 22.5);
    assert_eq!(cfg.delivery.queue_capacity, 32);
    assert!(cfg.log_file.is_none());
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "server_url": "http://inspection.local:8080",
        "pictures": { "dir": "/srv/pictures", "extension": "png" },
        "sampling": { "rate_hz": 100.0, "spike_probability": 0.0 },
        "surface": { "cycle_period_ms": 1000, "camera_vertical_fov_cm": 20.0 },
        "cameras": { "open_base_ms": 10, "open_jitter_ms": 0 },
        "delivery": { "queue_capacity": 4, "timeout_ms": 250 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("WEAVING_CONFIG", file.path());
    std::env::set_var("WEAVING_CYCLE_PERIOD_MS", "500");
    std::env::set_var("WEAVING_LOG_FILE", "/var/log/weaving.log");

    let cfg = WeavingConfig::load().expect("load config");

    assert_eq!(cfg.server_url, "http://inspection.local:8080");
    assert_eq!(cfg.pictures.dir, PathBuf::from("/srv/pictures"));
    assert_eq!(cfg.pictures.extension, "png");
    assert_eq!(cfg.sampling.rate_hz, 100.0);
    assert_eq!(cfg.sampling.spike_probability, 0.0);
    assert_eq!(cfg.sampling.base_velocity_cm_per_min, 30.0);
    assert_eq!(cfg.surface.cycle_period, Duration::from_millis(500));
    assert_eq!(cfg.displacement_threshold_cm(), 18.0);
    assert_eq!(cfg.cameras.open.base, Duration::from_millis(10));
    assert_eq!(cfg.cameras.collect.base, Duration::from_millis(4000));
    assert_eq!(cfg.delivery.queue_capacity, 4);
    assert_eq!(cfg.delivery.timeout, Duration::from_millis(250));
    assert_eq!(cfg.log_file, Some(PathBuf::from("/var/log/weaving.log")));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
server_url = "https://inspection.example"

[sampling]
rate_hz = 25.0

[surface]
smoothing_window = 5
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("WEAVING_CONFIG", file.path());

    let cfg = WeavingConfig::load().expect("load config");
    assert_eq!(cfg.server_url, "https://inspection.example");
    assert_eq!(cfg.sampling.rate_hz, 25.0);
    assert_eq!(cfg.surface.smoothing_window, 5);
    assert_eq!(cfg.surface.cycle_period, Duration::from_secs(2));

    clear_env();
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("WEAVING_SAMPLE_RATE_HZ", "fast");
    assert!(WeavingConfig::load().is_err());
    clear_env();

    std::env::set_var("WEAVING_SAMPLE_RATE_HZ", "0");
    assert!(WeavingConfig::load().is_err());
    clear_env();

    std::env::set_var("WEAVING_SERVER_URL", "ftp://inspection.local");
    assert!(WeavingConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var("WEAVING_CONFIG", file.path());
    assert!(WeavingConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_non_finite_sampling_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    for body in [
        "[sampling]\njitter_cm_per_min = nan\n",
        "[sampling]\njitter_cm_per_min = inf\n",
        "[sampling]\nbase_velocity_cm_per_min = nan\n",
        "[sampling]\nbase_velocity_cm_per_min = -inf\n",
        "[sampling]\nspike_probability = nan\n",
    ] {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
        std::env::set_var("WEAVING_CONFIG", file.path());
        assert!(WeavingConfig::load().is_err(), "accepted {:?}", body);
    }

    clear_env();
}
