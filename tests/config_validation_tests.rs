//! Config Validation Tests
//!
//! Typo detection, plausibility checks and fatal validation of the plant
//! configuration, exercised independently from the rest of the pipeline.

use std::io::Write;

use twinpulse::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use twinpulse::config::{ConfigError, PlantConfig};
use twinpulse::topology::TopologyRegistry;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_simulation_section_warns_with_suggestion() {
    let toml_str = r#"
[simulation]
intervall_ms = 500
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("intervall_ms"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("simulation.interval_ms"));
}

#[test]
fn typo_in_template_keeps_sensor_name_in_suggestion() {
    let toml_str = r#"
[templates.oil_pressure]
unit = "bar"
baseline = 4.0
warnnig = 2.5
critical = 1.5
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("templates.oil_pressure.warning")
    );
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[plant]
name = "Riverside Works"

[simulation]
interval_ms = 500
seed = 7
recovery_probability = 0.05

[publisher]
max_attempts = 3
initial_backoff_ms = 10
max_backoff_ms = 100

[pipeline]
max_clock_skew_secs = 60

[storage]
kind = "none"

[notifier]
kind = "log"

[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 2
sensors = ["temperature"]

[templates.temperature]
unit = "C"
baseline = 60.0
noise = 0.5
warning = 80.0
critical = 95.0
hysteresis_margin = 2.0
floor = -40.0
precision = 1
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Unexpected warnings: {warnings:?}");
    assert!(PlantConfig::from_toml_str(toml_str).is_ok());
}

#[test]
fn unknown_section_without_close_match_has_no_suggestion() {
    let warnings = validate_unknown_keys("[dashboard]\nport = 8080\n");
    assert!(!warnings.is_empty());
    assert!(warnings.iter().all(|w| w.suggestion.is_none()));
}

#[test]
fn unknown_keys_do_not_fail_loading() {
    let toml_str = r#"
[simulation]
intervall_ms = 500
"#;
    let config = PlantConfig::from_toml_str(toml_str).expect("typos only warn");
    assert_eq!(config.simulation.interval_ms, 1000);
}

#[test]
fn known_keys_cover_template_fields() {
    let keys = known_config_keys();
    for k in ["templates.*.hysteresis_margin", "topology.generated.sensors", "notifier.webhook_url"] {
        assert!(keys.contains(k), "missing {k}");
    }
    assert_eq!(
        suggest_correction("publisher.max_atempts", &keys).as_deref(),
        Some("publisher.max_attempts")
    );
}

// ============================================================================
// Plausibility
// ============================================================================

#[test]
fn margin_wider_than_threshold_gap_warns() {
    let mut config = PlantConfig::default();
    if let Some(t) = config.templates.get_mut("current") {
        t.hysteresis_margin = Some(10.0);
    }
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings
        .iter()
        .any(|w| w.field == "templates.current.hysteresis_margin"));
}

#[test]
fn walk_band_reaching_warning_warns() {
    let mut config = PlantConfig::default();
    if let Some(t) = config.templates.get_mut("temperature") {
        t.walk_band = 45.0;
    }
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings
        .iter()
        .any(|w| w.field == "templates.temperature.walk_band"));
}

#[test]
fn walk_without_noise_or_pull_is_fatal() {
    let toml_str = r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["winding"]

[templates.winding]
unit = "C"
baseline = 60.0
warning = 80.0
critical = 95.0
signal = "walk"
walk_band = 2.0
"#;
    let err = PlantConfig::from_toml_str(toml_str).unwrap_err().to_string();
    assert!(err.contains("walk signal needs noise"), "{err}");

    let with_pull = toml_str.replace("walk_band = 2.0", "walk_band = 2.0\nwalk_pull = 0.5");
    assert!(validate_unknown_keys(&with_pull).is_empty());
    assert!(PlantConfig::from_toml_str(&with_pull).is_ok());
}

#[test]
fn zero_clock_skew_is_an_error() {
    let mut config = PlantConfig::default();
    config.pipeline.max_clock_skew_secs = 0;
    let (errors, _) = validate_physical_ranges(&config);
    assert_eq!(errors.len(), 1);
    assert!(config.validate().is_err());
}

#[test]
fn defaults_are_plausible() {
    let (errors, warnings) = validate_physical_ranges(&PlantConfig::default());
    assert!(errors.is_empty());
    assert!(warnings.is_empty(), "Unexpected warnings: {warnings:?}");
}

// ============================================================================
// Fatal Validation
// ============================================================================

#[test]
fn undefined_template_is_fatal() {
    let toml_str = r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["humidity"]
"#;
    match PlantConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("humidity") && e.contains("undefined template")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn malformed_identifiers_are_fatal() {
    let toml_str = r#"
[[topology.sectors]]
id = "north"

[[topology.sectors.lines]]
id = "line_1"

[[topology.sectors.lines.assets]]
id = "pump-7"
sensors = ["vibration", "vibration"]
"#;
    let err = PlantConfig::from_toml_str(toml_str).unwrap_err().to_string();
    assert!(err.contains("'north'"));
    assert!(err.contains("'pump-7'"));
    assert!(err.contains("repeated"));
}

#[test]
fn syntax_error_names_the_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[simulation\ninterval_ms = 5").unwrap();
    let err = PlantConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(ref p, _) if p == file.path()));
}

#[test]
fn missing_explicit_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PlantConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn explicit_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[plant]
name = "file-plant"

[topology.generated]
sectors = 3
lines_per_sector = 1
assets_per_line = 1
sensors = ["vibration"]
"#
    )
    .unwrap();
    let config = PlantConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.plant.name, "file-plant");
    let registry = TopologyRegistry::load(&config).unwrap();
    assert_eq!(registry.sensor_count(), 3);
}

#[test]
fn serialized_config_reloads() {
    let config = PlantConfig::default();
    let text = config.to_toml().unwrap();
    assert!(validate_unknown_keys(&text).is_empty());
    let reloaded = PlantConfig::from_toml_str(&text).unwrap();
    assert_eq!(reloaded.templates.len(), config.templates.len());
    assert_eq!(reloaded.topology.expand().len(), 12);
}

#[test]
fn example_plant_file_is_valid() {
    let config = PlantConfig::load_from_file(std::path::Path::new("plant.example.toml"))
        .expect("plant.example.toml must validate");
    assert!(TopologyRegistry::load(&config).unwrap().sensor_count() > 0);
}
