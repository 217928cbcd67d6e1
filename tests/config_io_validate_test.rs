use powerlimiter::config::{BatteryDrainStrategy, Config};
use powerlimiter::sources::InverterId;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("powerlimiter.yaml");

    let mut cfg = Config::default();
    cfg.power_limiter.enabled = true;
    cfg.power_limiter.inverter_id = InverterId(0x1164_8000_1234);
    cfg.power_limiter.battery_drain_strategy = BatteryDrainStrategy::EmptyWhenFull;
    cfg.power_limiter.restart_hour = 4;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded, cfg);
    assert!(loaded.validate().is_ok());
}

#[test]
fn partial_yaml_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"power_limiter:\n  enabled: true\n  battery_drain_strategy: empty_when_full\n  upper_power_limit: 600\ntimezone: Europe/Amsterdam\n",
    )
    .unwrap();

    let cfg = Config::from_file(tmp.path()).unwrap();
    assert!(cfg.power_limiter.enabled);
    assert_eq!(
        cfg.power_limiter.battery_drain_strategy,
        BatteryDrainStrategy::EmptyWhenFull
    );
    assert_eq!(cfg.power_limiter.upper_power_limit, 600);
    assert_eq!(cfg.power_limiter.lower_power_limit, 10);
    assert_eq!(cfg.poll_interval_ms, 100);
    assert!(cfg.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    cfg.power_limiter.lower_power_limit = -1;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.power_limiter.upper_power_limit = 5;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.power_limiter.target_power_consumption_hysteresis = -3;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.power_limiter.restart_hour = 24;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.power_limiter.battery_soc_start_threshold = 101.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.power_limiter.solar_passthrough_losses = 120;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.power_limiter.inverter_efficiency_fallback = 0.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.timezone = "Mars/Olympus_Mons".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn load_from_missing_path_fails() {
    let res = Config::load_from(Some(std::path::PathBuf::from(
        "/definitely/missing/powerlimiter.yaml",
    )));
    assert!(res.is_err());
}
