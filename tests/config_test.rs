// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_sensorstream::config::{
    AcquisitionConfig, BusConfig, BusType, Config, HandlerConfig, SensorConfig, TargetConfig,
};
use rust_sensorstream::sensor::SensorKind;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Create a custom config
    let config = Config {
        bus: BusConfig {
            bus_type: BusType::Mock,
            device: "/dev/i2c-0".to_string(),
        },
        sensor: SensorConfig {
            kind: SensorKind::Bme280,
            address: Some(0x77),
            oversampling: 4,
            ..SensorConfig::default()
        },
        acquisition: AcquisitionConfig {
            enabled: true,
            delay_ms: 250,
            read_timeout_ms: Some(100),
        },
        handlers: vec![
            HandlerConfig::log("console"),
            HandlerConfig {
                id: "dashboard".to_string(),
                target: TargetConfig::Http {
                    url: "https://example.com/hook".to_string(),
                    timeout_seconds: 5,
                    retry_count: 1,
                    auth_token: Some("token".to_string()),
                },
            },
        ],
    };

    config.save_to_file(&config_path)?;
    let loaded_config = Config::from_file(&config_path)?;
    assert_eq!(loaded_config, config);

    // Test loading default config for non-existent file
    let non_existent_path = temp_dir.path().join("non_existent.yaml");
    let default_config = Config::from_file(&non_existent_path)?;

    assert!(non_existent_path.exists());
    assert_eq!(default_config, Config::default());
    assert_eq!(default_config.acquisition.delay_ms, 500);
    assert_eq!(default_config.sensor.sensitivity, 16);
    assert_eq!(default_config.sensor.data_rate, 400.0);

    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        r#"
sensor:
  kind: adxl345
  sensitivity: 4
  data_rate: 800
acquisition:
  delay_ms: 100
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.sensor.sensitivity, 4);
    assert_eq!(config.sensor.data_rate, 800.0);
    assert_eq!(config.sensor.resolved_address(), 0x53);
    assert_eq!(config.acquisition.delay_ms, 100);
    assert!(config.acquisition.enabled);
    assert_eq!(config.bus.bus_type, BusType::Native);
    assert_eq!(config.handlers, vec![HandlerConfig::log("log")]);

    Ok(())
}

#[test]
fn test_empty_config_file_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;

    for (name, contents) in [
        ("empty.yaml", ""),
        ("comments.yaml", "# sampling settings go here\n"),
    ] {
        let config_path = temp_dir.path().join(name);
        fs::write(&config_path, contents)?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config, Config::default());
        assert!(!config_path.with_extension("sample.yaml").exists());
    }

    Ok(())
}

#[test]
fn test_unknown_selectors_are_not_errors() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        r#"
sensor:
  sensitivity: 3
  data_rate: 790
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.sensor.sensitivity, 3);
    assert_eq!(config.sensor.data_rate, 790.0);

    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();

    config.apply_args(None, None, None, None, false);
    assert_eq!(config, Config::default());

    config.apply_args(
        Some(100),
        Some(8),
        Some(1600.0),
        Some("/dev/i2c-3".to_string()),
        true,
    );
    assert_eq!(config.acquisition.delay_ms, 100);
    assert_eq!(config.sensor.sensitivity, 8);
    assert_eq!(config.sensor.data_rate, 1600.0);
    assert_eq!(config.bus.device, "/dev/i2c-3");
    assert_eq!(config.bus.bus_type, BusType::Mock);
}

#[test]
fn test_config_validation() {
    assert!(Config::default().validate().is_ok());

    let mut config = Config::default();
    config.apply_args(Some(0), None, None, None, false);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.handlers.clear();
    assert!(config.validate().is_err());
}
