//! Plant Configuration - topology, sensor templates and pipeline knobs
//!
//! One TOML document is the single source of truth for the whole system. It
//! is parsed once at startup, validated in full, and then shared read-only.
//! Each struct implements `Default` so partial files only override what they
//! name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::types::{AssetId, Segment, ThresholdDirection};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "TWINPULSE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "twinpulse.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one simulated plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default)]
    pub plant: PlantInfo,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub alarm: AlarmConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub topology: TopologyConfig,

    /// Sensor templates keyed by sensor type.
    #[serde(default = "default_templates")]
    pub templates: BTreeMap<String, TemplateConfig>,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            plant: PlantInfo::default(),
            simulation: SimulationConfig::default(),
            publisher: PublisherConfig::default(),
            pipeline: PipelineConfig::default(),
            alarm: AlarmConfig::default(),
            storage: StorageConfig::default(),
            notifier: NotifierConfig::default(),
            topology: TopologyConfig::default(),
            templates: default_templates(),
        }
    }
}

impl PlantConfig {
    /// Resolve the config using the standard search order:
    /// 1. an explicit path (from `--config`)
    /// 2. `$TWINPULSE_CONFIG`
    /// 3. `./twinpulse.toml`
    /// 4. built-in demo plant
    ///
    /// Unlike a missing file, a file that exists but fails to parse or
    /// validate is an error: a partial configuration is never accepted.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), plant = %config.plant.name, "Loaded plant config");
            return Ok(config);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), plant = %config.plant.name, "Loaded plant config from {}", CONFIG_ENV_VAR);
                return Ok(config);
            }
            warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(plant = %config.plant.name, "Loaded plant config from ./{}", LOCAL_CONFIG_FILE);
            return Ok(config);
        }

        info!("No {} found, using built-in demo plant", LOCAL_CONFIG_FILE);
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Syntax(e) => ConfigError::Parse(path.to_path_buf(), e),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only produce warnings; everything else that is wrong is
    /// collected into a single [`ConfigError::Validation`].
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::Syntax)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate every knob, template and topology node.
    ///
    /// Reports all violations, not just the first one found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let s = &self.simulation;
        if s.interval_ms == 0 {
            errors.push("simulation.interval_ms must be > 0".to_string());
        }
        Self::check_probability(s.recovery_probability, "simulation.recovery_probability", &mut errors);
        if !s.fault_multiplier.is_finite() || s.fault_multiplier <= 1.0 {
            errors.push(format!(
                "simulation.fault_multiplier ({}) must be > 1.0 so faults cross the critical threshold",
                s.fault_multiplier
            ));
        }
        if !s.degrade_ceiling.is_finite() || s.degrade_ceiling <= 0.0 || s.degrade_ceiling >= 1.0 {
            errors.push(format!(
                "simulation.degrade_ceiling ({}) must be in (0, 1)",
                s.degrade_ceiling
            ));
        }

        let p = &self.publisher;
        if p.max_attempts == 0 {
            errors.push("publisher.max_attempts must be > 0".to_string());
        }
        if p.initial_backoff_ms > p.max_backoff_ms {
            errors.push(format!(
                "publisher.initial_backoff_ms ({}) must be <= max_backoff_ms ({})",
                p.initial_backoff_ms, p.max_backoff_ms
            ));
        }
        if p.bus_capacity == 0 {
            errors.push("publisher.bus_capacity must be > 0".to_string());
        }

        if !self.alarm.default_margin_ratio.is_finite() || self.alarm.default_margin_ratio < 0.0 {
            errors.push(format!(
                "alarm.default_margin_ratio ({}) must be a finite value >= 0",
                self.alarm.default_margin_ratio
            ));
        }

        if self.notifier.kind == NotifierKind::Webhook && self.notifier.webhook_url.is_empty() {
            errors.push("notifier.webhook_url is required when notifier.kind = \"webhook\"".to_string());
        }

        for (name, template) in &self.templates {
            template.check(name, &mut errors);
        }

        self.check_topology(&mut errors);

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_topology(&self, errors: &mut Vec<String>) {
        let assets = self.topology.expand();
        if assets.is_empty() {
            errors.push("topology defines no assets".to_string());
        }

        let mut seen_assets: HashSet<&AssetId> = HashSet::new();
        for (asset, sensors) in &assets {
            if !Segment::Sector.accepts(&asset.sector) {
                errors.push(format!("topology: sector id '{}' must look like sector_<N>", asset.sector));
            }
            if !Segment::Line.accepts(&asset.line) {
                errors.push(format!("topology: line id '{}' must look like line_<N>", asset.line));
            }
            if !Segment::Asset.accepts(&asset.asset) {
                errors.push(format!("topology: asset id '{}' must look like asset_<N>", asset.asset));
            }
            if !seen_assets.insert(asset) {
                errors.push(format!("topology: asset {asset} is declared more than once"));
            }
            if sensors.is_empty() {
                errors.push(format!("topology: asset {asset} has no sensors"));
            }

            let mut seen_sensors: HashSet<&str> = HashSet::new();
            for sensor in sensors {
                if !Segment::SensorType.accepts(sensor) {
                    errors.push(format!(
                        "topology: sensor type '{sensor}' on {asset} must match [a-z][a-z0-9_]*"
                    ));
                }
                if !seen_sensors.insert(sensor.as_str()) {
                    errors.push(format!("topology: sensor '{sensor}' repeated on {asset}"));
                }
                if !self.templates.contains_key(sensor) {
                    errors.push(format!(
                        "topology: sensor '{sensor}' on {asset} references undefined template"
                    ));
                }
            }
        }
    }

    fn check_probability(p: f64, name: &str, errors: &mut Vec<String>) {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            errors.push(format!("{name} ({p}) must be a probability in [0, 1]"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config parse error: {0}")]
    Syntax(#[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),

    #[error("Sensor type '{0}' has no template")]
    UnknownSensorType(String),
}

// ============================================================================
// Plant Info
// ============================================================================

/// Identification metadata. Appears in logs only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantInfo {
    #[serde(default = "default_plant_name")]
    pub name: String,
}

fn default_plant_name() -> String {
    "demo-plant".to_string()
}

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Tick period (ms).
    pub interval_ms: u64,
    /// Seed for reproducible runs. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Per-tick probability that a faulted asset recovers.
    pub recovery_probability: f64,
    /// How far past critical a faulted asset reads.
    pub fault_multiplier: f64,
    /// Fraction of the baseline→warning span a degrading asset may drift.
    pub degrade_ceiling: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::SIMULATION_INTERVAL_MS,
            seed: None,
            recovery_probability: defaults::RECOVERY_PROBABILITY,
            fault_multiplier: defaults::FAULT_MULTIPLIER,
            degrade_ceiling: defaults::DEGRADE_CEILING,
        }
    }
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Attempts per reading (first try included).
    pub max_attempts: u32,
    /// First retry delay (ms); doubles per attempt.
    pub initial_backoff_ms: u64,
    /// Retry delay ceiling (ms).
    pub max_backoff_ms: u64,
    /// In-process bus capacity (messages).
    pub bus_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::PUBLISH_MAX_ATTEMPTS,
            initial_backoff_ms: defaults::PUBLISH_INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::PUBLISH_MAX_BACKOFF_MS,
            bus_capacity: defaults::BUS_CAPACITY,
        }
    }
}

// ============================================================================
// Pipeline / Alarm
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum |reading time − pipeline time| (s).
    pub max_clock_skew_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_secs: defaults::MAX_CLOCK_SKEW_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Margin as a fraction of |critical − warning| when a template sets none.
    pub default_margin_ratio: f64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            default_margin_ratio: defaults::DEFAULT_MARGIN_RATIO,
        }
    }
}

// ============================================================================
// Storage / Notifier
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Sled,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Sled,
            path: PathBuf::from(defaults::STORAGE_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub webhook_url: String,
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: String::new(),
            timeout_ms: defaults::WEBHOOK_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Topology
// ============================================================================

/// Plant hierarchy: an explicit sector → line → asset tree, a compact
/// generated block, or both (explicit nodes first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub sectors: Vec<SectorNode>,

    #[serde(default)]
    pub generated: Option<GeneratedTopology>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            sectors: Vec::new(),
            generated: Some(GeneratedTopology::default()),
        }
    }
}

impl TopologyConfig {
    /// Flatten the tree into assets with their sensor lists, in declaration
    /// order.
    pub fn expand(&self) -> Vec<(AssetId, Vec<String>)> {
        let mut out = Vec::new();
        for sector in &self.sectors {
            for line in &sector.lines {
                for asset in &line.assets {
                    out.push((
                        AssetId::new(&sector.id, &line.id, &asset.id),
                        asset.sensors.clone(),
                    ));
                }
            }
        }
        if let Some(ref generated) = self.generated {
            out.extend(generated.expand());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorNode {
    pub id: String,
    #[serde(default)]
    pub lines: Vec<LineNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineNode {
    pub id: String,
    #[serde(default)]
    pub assets: Vec<AssetNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetNode {
    pub id: String,
    #[serde(default)]
    pub sensors: Vec<String>,
}

/// Procedural topology: every asset gets the same sensor set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedTopology {
    pub sectors: u32,
    pub lines_per_sector: u32,
    pub assets_per_line: u32,
    pub sensors: Vec<String>,
}

impl Default for GeneratedTopology {
    fn default() -> Self {
        Self {
            sectors: 2,
            lines_per_sector: 2,
            assets_per_line: 3,
            sensors: vec![
                "vibration".to_string(),
                "temperature".to_string(),
                "current".to_string(),
            ],
        }
    }
}

impl GeneratedTopology {
    /// Expand to `sector_<s>/line_<l>/asset_<a>` with 1-based indices.
    pub fn expand(&self) -> Vec<(AssetId, Vec<String>)> {
        let mut out = Vec::new();
        for s in 1..=self.sectors {
            for l in 1..=self.lines_per_sector {
                for a in 1..=self.assets_per_line {
                    out.push((
                        AssetId::new(format!("sector_{s}"), format!("line_{l}"), format!("asset_{a}")),
                        self.sensors.clone(),
                    ));
                }
            }
        }
        out
    }
}

// ============================================================================
// Sensor Templates
// ============================================================================

/// Physical model and alarm limits for one sensor type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub unit: String,
    /// Nominal operating value.
    pub baseline: f64,
    /// Noise amplitude; samples never deviate more than this from the mean.
    #[serde(default)]
    pub noise: f64,
    /// Drift added per tick while an asset is degrading or faulted.
    #[serde(default)]
    pub drift_rate: f64,
    pub warning: f64,
    pub critical: f64,
    #[serde(default)]
    pub direction: ThresholdDirection,
    /// Distance back past a threshold required to downgrade severity.
    #[serde(default)]
    pub hysteresis_margin: Option<f64>,
    /// Per-tick fault probability for an asset carrying this sensor.
    #[serde(default)]
    pub failure_probability: f64,
    /// Per-asset working point spread: baseline ± uniform(variance).
    #[serde(default)]
    pub baseline_variance: f64,
    /// Probability of a transient spike on any reading.
    #[serde(default)]
    pub spike_probability: f64,
    #[serde(default)]
    pub spike_magnitude: f64,
    /// Physical lower bound (e.g. magnitudes never go negative).
    #[serde(default)]
    pub floor: Option<f64>,
    /// Decimal places kept on emitted values.
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Emit on every Nth tick.
    #[serde(default = "default_sample_every")]
    pub sample_every: u32,
    #[serde(default)]
    pub signal: SignalShape,
    /// Walk only: half-width of the band around the working point inside
    /// which the level wanders freely.
    #[serde(default)]
    pub walk_band: f64,
    /// Walk only: correction applied per tick while outside the band.
    /// Defaults to the noise amplitude.
    #[serde(default)]
    pub walk_pull: Option<f64>,
}

/// How a sensor's nominal signal evolves between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalShape {
    /// Independent noise around the working point every tick.
    #[default]
    Steady,
    /// Thermally inert: noise accumulates into a random walk that is pulled
    /// back elastically once it leaves `walk_band`.
    Walk,
}

fn default_precision() -> u32 {
    3
}

fn default_sample_every() -> u32 {
    1
}

impl TemplateConfig {
    fn check(&self, name: &str, errors: &mut Vec<String>) {
        if !Segment::SensorType.accepts(name) {
            errors.push(format!("templates.{name}: sensor type must match [a-z][a-z0-9_]*"));
        }

        let numbers = [
            ("baseline", self.baseline),
            ("noise", self.noise),
            ("drift_rate", self.drift_rate),
            ("warning", self.warning),
            ("critical", self.critical),
            ("failure_probability", self.failure_probability),
            ("baseline_variance", self.baseline_variance),
            ("spike_probability", self.spike_probability),
            ("spike_magnitude", self.spike_magnitude),
            ("walk_band", self.walk_band),
        ];
        for (field, v) in numbers {
            if !v.is_finite() {
                errors.push(format!("templates.{name}.{field} must be finite (got {v})"));
            }
        }
        if numbers.iter().any(|(_, v)| !v.is_finite()) {
            return;
        }

        match self.direction {
            ThresholdDirection::Rising if self.warning >= self.critical => errors.push(format!(
                "templates.{name}: warning ({}) must be < critical ({}) for a rising metric",
                self.warning, self.critical
            )),
            ThresholdDirection::Falling if self.warning <= self.critical => errors.push(format!(
                "templates.{name}: warning ({}) must be > critical ({}) for a falling metric",
                self.warning, self.critical
            )),
            _ => {}
        }

        if self.direction.breaches(self.baseline, self.warning) {
            errors.push(format!(
                "templates.{name}: baseline ({}) already breaches warning ({})",
                self.baseline, self.warning
            ));
        }

        if let Some(margin) = self.hysteresis_margin {
            if !margin.is_finite() || margin < 0.0 {
                errors.push(format!("templates.{name}.hysteresis_margin ({margin}) must be >= 0"));
            }
        }

        for (field, v) in [
            ("noise", self.noise),
            ("drift_rate", self.drift_rate),
            ("baseline_variance", self.baseline_variance),
            ("walk_band", self.walk_band),
        ] {
            if v < 0.0 {
                errors.push(format!("templates.{name}.{field} ({v}) must be >= 0"));
            }
        }

        PlantConfig::check_probability(
            self.failure_probability,
            &format!("templates.{name}.failure_probability"),
            errors,
        );
        PlantConfig::check_probability(
            self.spike_probability,
            &format!("templates.{name}.spike_probability"),
            errors,
        );

        if let Some(floor) = self.floor {
            if !floor.is_finite() {
                errors.push(format!("templates.{name}.floor must be finite"));
            }
        }
        if self.precision > 9 {
            errors.push(format!("templates.{name}.precision ({}) must be <= 9", self.precision));
        }
        if self.sample_every == 0 {
            errors.push(format!("templates.{name}.sample_every must be > 0"));
        }
        if let Some(pull) = self.walk_pull {
            if !pull.is_finite() || pull <= 0.0 {
                errors.push(format!("templates.{name}.walk_pull ({pull}) must be > 0"));
            }
        }
        if self.signal == SignalShape::Walk && self.walk_pull.is_none() && self.noise <= 0.0 {
            errors.push(format!(
                "templates.{name}: a walk signal needs noise > 0 or an explicit walk_pull"
            ));
        }
    }

    /// Elastic pull of a walk signal.
    pub fn pull(&self) -> f64 {
        self.walk_pull.unwrap_or(self.noise)
    }

    /// Furthest a nominal reading can sit from the working point.
    pub fn excursion(&self) -> f64 {
        match self.signal {
            SignalShape::Steady => self.noise,
            SignalShape::Walk => self.walk_band + self.noise.max(self.pull()),
        }
    }

    /// Hysteresis margin, falling back to a fraction of the threshold gap.
    pub fn margin(&self, default_ratio: f64) -> f64 {
        self.hysteresis_margin
            .unwrap_or_else(|| (self.critical - self.warning).abs() * default_ratio)
    }
}

/// Industrial motor templates: vibration (ISO 10816, mm/s), winding
/// temperature (insulation class F, °C, thermally inert) and current draw
/// (55 kW, A).
fn default_templates() -> BTreeMap<String, TemplateConfig> {
    let mut t = BTreeMap::new();
    t.insert(
        "vibration".to_string(),
        TemplateConfig {
            unit: "mm/s".to_string(),
            baseline: 1.0,
            noise: 0.15,
            drift_rate: 0.05,
            warning: 4.5,
            critical: 7.1,
            direction: ThresholdDirection::Rising,
            hysteresis_margin: Some(0.3),
            failure_probability: 0.002,
            baseline_variance: 0.5,
            spike_probability: 0.02,
            spike_magnitude: 0.8,
            floor: Some(0.0),
            precision: 3,
            sample_every: 1,
            signal: SignalShape::Steady,
            walk_band: 0.0,
            walk_pull: None,
        },
    );
    t.insert(
        "temperature".to_string(),
        TemplateConfig {
            unit: "°C".to_string(),
            baseline: 90.0,
            noise: 1.0,
            drift_rate: 0.5,
            warning: 130.0,
            critical: 150.0,
            direction: ThresholdDirection::Rising,
            hysteresis_margin: Some(3.0),
            failure_probability: 0.001,
            baseline_variance: 5.0,
            spike_probability: 0.0,
            spike_magnitude: 0.0,
            floor: None,
            precision: 1,
            sample_every: 1,
            signal: SignalShape::Walk,
            walk_band: 4.0,
            walk_pull: None,
        },
    );
    t.insert(
        "current".to_string(),
        TemplateConfig {
            unit: "A".to_string(),
            baseline: 90.0,
            noise: 0.8,
            drift_rate: 0.2,
            warning: 105.0,
            critical: 110.0,
            direction: ThresholdDirection::Rising,
            hysteresis_margin: Some(1.0),
            failure_probability: 0.001,
            baseline_variance: 2.0,
            spike_probability: 0.0,
            spike_magnitude: 0.0,
            floor: Some(0.0),
            precision: 2,
            sample_every: 1,
            signal: SignalShape::Steady,
            walk_band: 0.0,
            walk_pull: None,
        },
    );
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = PlantConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: PlantConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.simulation.interval_ms, 1_000);
        assert_eq!(config.pipeline.max_clock_skew_secs, 300);
        assert_eq!(config.templates.len(), 3);
        assert_eq!(config.topology.expand().len(), 12);
    }

    #[test]
    fn test_generated_topology_naming() {
        let g = GeneratedTopology {
            sectors: 1,
            lines_per_sector: 2,
            assets_per_line: 2,
            sensors: vec!["temperature".to_string()],
        };
        let ids: Vec<String> = g.expand().iter().map(|(a, _)| a.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "sector_1/line_1/asset_1",
                "sector_1/line_1/asset_2",
                "sector_1/line_2/asset_1",
                "sector_1/line_2/asset_2",
            ]
        );
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = PlantConfig::default();
        if let Some(t) = config.templates.get_mut("temperature") {
            t.warning = 160.0;
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("templates.temperature"));
    }

    #[test]
    fn test_falling_metric_accepts_inverse_thresholds() {
        let toml_str = r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["oil_pressure"]

[templates.oil_pressure]
unit = "bar"
baseline = 4.0
warning = 2.5
critical = 1.5
direction = "falling"
"#;
        let config = PlantConfig::from_toml_str(toml_str).expect("falling metric should validate");
        assert_eq!(config.templates["oil_pressure"].direction, ThresholdDirection::Falling);
    }

    #[test]
    fn test_all_violations_reported() {
        let toml_str = r#"
[simulation]
interval_ms = 0

[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["vibration", "pressure"]

[templates.vibration]
unit = "mm/s"
baseline = 1.0
warning = 7.0
critical = 4.0
"#;
        match PlantConfig::from_toml_str(toml_str) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("interval_ms")));
                assert!(errors.iter().any(|e| e.contains("'pressure'")));
                assert!(errors.iter().any(|e| e.contains("templates.vibration")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_margin_falls_back_to_ratio() {
        let mut t = default_templates().remove("current").unwrap();
        t.hysteresis_margin = None;
        assert!((t.margin(0.1) - 0.5).abs() < 1e-9);
    }
}
