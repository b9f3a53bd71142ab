//! Configuration loading, layering and validation

use idcapture::config::IdCaptureConfig;
use idcapture::errors::CaptureError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_save_then_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("idcapture.toml");

    let mut config = IdCaptureConfig::default();
    config.readiness.fire_threshold = 6;
    config.ovd.enabled = false;
    config.mrz.country_codes = vec!["TUR".to_string(), "DEU".to_string()];
    config.guide.view_width = Some(390.0);
    config.guide.view_height = Some(844.0);

    config.save_to_file(&path).unwrap();
    assert!(path.exists());
    let loaded = IdCaptureConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let loaded = IdCaptureConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, IdCaptureConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    fs::write(&path, "[flow]\nsettle_delay_secs = 1.5\n\n[motion]\nmoving_score = 4\n").unwrap();

    let loaded = IdCaptureConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.flow.settle_delay_secs, 1.5);
    assert_eq!(loaded.flow.jpeg_quality, 90);
    assert_eq!(loaded.motion.moving_score, 4);
    assert_eq!(loaded.readiness, IdCaptureConfig::default().readiness);
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[readiness\nfire_threshold = ").unwrap();
    assert!(matches!(
        IdCaptureConfig::load_from_file(&path),
        Err(CaptureError::Config(_))
    ));
}

#[test]
fn test_layered_env_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("layered.toml");
    fs::write(&path, "[readiness]\nfire_threshold = 5\ncooldown_secs = 2.0\n").unwrap();

    std::env::set_var("IDCAPTURE__READINESS__FIRE_THRESHOLD", "9");
    let loaded = IdCaptureConfig::load_layered(&path);
    std::env::remove_var("IDCAPTURE__READINESS__FIRE_THRESHOLD");

    let loaded = loaded.unwrap();
    assert_eq!(loaded.readiness.fire_threshold, 9);
    assert_eq!(loaded.readiness.cooldown_secs, 2.0);
    assert_eq!(loaded.ovd, IdCaptureConfig::default().ovd);
}

#[test]
fn test_layered_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("invalid.toml");
    fs::write(&path, "[ovd]\nhold_fire = 20\nhold_max = 12\n").unwrap();
    assert!(matches!(
        IdCaptureConfig::load_layered(&path),
        Err(CaptureError::Config(_))
    ));
}

#[test]
fn test_validation_catches_inverted_ranges() {
    let mut config = IdCaptureConfig::default();
    config.readiness.coverage_min = 1.2;
    assert!(config.validate().is_err());

    let mut config = IdCaptureConfig::default();
    config.motion.moving_score = 11;
    assert!(config.validate().is_err());

    let mut config = IdCaptureConfig::default();
    config.mrz.chevrons_weak = 12;
    assert!(config.validate().is_err());

    let mut config = IdCaptureConfig::default();
    config.flow.jpeg_quality = 0;
    assert!(config.validate().is_err());

    let mut config = IdCaptureConfig::default();
    config.ovd.torch_level = 1.5;
    assert!(config.validate().is_err());
}
