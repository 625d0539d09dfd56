//! Topology Registry
//!
//! Immutable sector → line → asset → sensor hierarchy plus the resolved
//! sensor templates. Built once from a validated [`PlantConfig`] and shared
//! read-only (behind an `Arc`) by the generator, pipeline and alarm engine.

use std::collections::{BTreeMap, HashSet};

use crate::config::{ConfigError, PlantConfig, SignalShape, TemplateConfig};
use crate::types::{AssetId, ChannelKey, ThresholdDirection};

/// Template with its hysteresis margin resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTemplate {
    pub sensor_type: String,
    pub unit: String,
    pub baseline: f64,
    pub noise: f64,
    pub drift_rate: f64,
    pub warning: f64,
    pub critical: f64,
    pub direction: ThresholdDirection,
    pub margin: f64,
    pub failure_probability: f64,
    pub baseline_variance: f64,
    pub spike_probability: f64,
    pub spike_magnitude: f64,
    pub floor: Option<f64>,
    pub precision: u32,
    pub sample_every: u32,
    pub signal: SignalShape,
    pub walk_band: f64,
    /// Resolved elastic pull (explicit or the noise amplitude).
    pub walk_pull: f64,
}

impl SensorTemplate {
    fn from_config(sensor_type: &str, t: &TemplateConfig, default_margin_ratio: f64) -> Self {
        Self {
            sensor_type: sensor_type.to_string(),
            unit: t.unit.clone(),
            baseline: t.baseline,
            noise: t.noise,
            drift_rate: t.drift_rate,
            warning: t.warning,
            critical: t.critical,
            direction: t.direction,
            margin: t.margin(default_margin_ratio),
            failure_probability: t.failure_probability,
            baseline_variance: t.baseline_variance,
            spike_probability: t.spike_probability,
            spike_magnitude: t.spike_magnitude,
            floor: t.floor,
            precision: t.precision,
            sample_every: t.sample_every,
            signal: t.signal,
            walk_band: t.walk_band,
            walk_pull: t.pull(),
        }
    }
}

/// One asset and the sensor types mounted on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub id: AssetId,
    pub sensors: Vec<String>,
}

/// Read-only plant model.
#[derive(Debug, Clone)]
pub struct TopologyRegistry {
    assets: Vec<AssetEntry>,
    sensors: Vec<ChannelKey>,
    index: HashSet<ChannelKey>,
    templates: BTreeMap<String, SensorTemplate>,
}

impl TopologyRegistry {
    /// Build the registry, re-running full validation first.
    ///
    /// Any violation aborts with every problem listed.
    pub fn load(config: &PlantConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let ratio = config.alarm.default_margin_ratio;
        let templates = config
            .templates
            .iter()
            .map(|(name, t)| (name.clone(), SensorTemplate::from_config(name, t, ratio)))
            .collect();

        let assets: Vec<AssetEntry> = config
            .topology
            .expand()
            .into_iter()
            .map(|(id, sensors)| AssetEntry { id, sensors })
            .collect();

        let sensors: Vec<ChannelKey> = assets
            .iter()
            .flat_map(|a| a.sensors.iter().map(move |s| a.id.sensor(s.as_str())))
            .collect();
        let index = sensors.iter().cloned().collect();

        tracing::debug!(
            assets = assets.len(),
            sensors = sensors.len(),
            "Topology registry loaded"
        );

        Ok(Self {
            assets,
            sensors,
            index,
            templates,
        })
    }

    /// Template for a sensor type.
    pub fn resolve_template(&self, sensor_type: &str) -> Result<&SensorTemplate, ConfigError> {
        self.templates
            .get(sensor_type)
            .ok_or_else(|| ConfigError::UnknownSensorType(sensor_type.to_string()))
    }

    /// Every sensor channel, in declaration order.
    pub fn list_sensors(&self) -> &[ChannelKey] {
        &self.sensors
    }

    /// Every asset with its sensors, in declaration order.
    pub fn assets(&self) -> &[AssetEntry] {
        &self.assets
    }

    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.index.contains(key)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"
[[topology.sectors]]
id = "sector_2"

[[topology.sectors.lines]]
id = "line_1"

[[topology.sectors.lines.assets]]
id = "asset_9"
sensors = ["temperature", "vibration"]

[[topology.sectors.lines.assets]]
id = "asset_3"
sensors = ["vibration"]

[templates.temperature]
unit = "C"
baseline = 60.0
warning = 80.0
critical = 95.0

[templates.vibration]
unit = "mm/s"
baseline = 1.0
warning = 4.5
critical = 7.1
"#;

    fn tree_config() -> PlantConfig {
        let mut config: PlantConfig = toml::from_str(TREE).unwrap();
        config.topology.generated = None;
        config
    }

    #[test]
    fn lists_sensors_in_declaration_order() {
        let registry = TopologyRegistry::load(&tree_config()).unwrap();
        let channels: Vec<String> = registry.list_sensors().iter().map(ToString::to_string).collect();
        assert_eq!(
            channels,
            vec![
                "sector_2/line_1/asset_9/temperature",
                "sector_2/line_1/asset_9/vibration",
                "sector_2/line_1/asset_3/vibration",
            ]
        );
        assert_eq!(registry.asset_count(), 2);
    }

    #[test]
    fn resolves_every_sensor_type_in_topology() {
        let registry = TopologyRegistry::load(&PlantConfig::default()).unwrap();
        for key in registry.list_sensors() {
            assert!(registry.resolve_template(&key.sensor_type).is_ok());
        }
    }

    #[test]
    fn unknown_sensor_type_fails() {
        let registry = TopologyRegistry::load(&PlantConfig::default()).unwrap();
        assert!(matches!(
            registry.resolve_template("humidity"),
            Err(ConfigError::UnknownSensorType(ref s)) if s == "humidity"
        ));
    }

    #[test]
    fn missing_template_fails_load() {
        let mut config = tree_config();
        config.templates.remove("vibration");
        let err = TopologyRegistry::load(&config).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                // Both assets reference the missing template.
                assert_eq!(errors.iter().filter(|e| e.contains("undefined template")).count(), 2);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn contains_only_declared_channels() {
        let registry = TopologyRegistry::load(&tree_config()).unwrap();
        assert!(registry.contains(&ChannelKey::new("sector_2", "line_1", "asset_3", "vibration")));
        assert!(!registry.contains(&ChannelKey::new("sector_2", "line_1", "asset_3", "temperature")));
    }

    #[test]
    fn default_margin_ratio_applies() {
        let registry = TopologyRegistry::load(&tree_config()).unwrap();
        let t = registry.resolve_template("temperature").unwrap();
        assert!((t.margin - 1.5).abs() < 1e-9);
    }
}
