//! Digital twin signal generator
//!
//! Each asset owns its RNG stream (derived from the run seed and the asset's
//! declaration index), its fault mode and its sensors' drift/sequence state.
//! Nothing is shared between assets except the read-only templates, so a
//! tick is computed across assets in parallel and still reproduces exactly
//! for a fixed seed.

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info};

use super::fault::{next_mode, FaultMode};
use crate::config::{SignalShape, SimulationConfig};
use crate::topology::{SensorTemplate, TopologyRegistry};
use crate::types::{AssetId, ChannelKey, Reading};

/// Odd constant spreading per-asset seeds across the u64 space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Stateful model of one sensor on one asset.
#[derive(Debug, Clone)]
struct SensorTwin {
    key: ChannelKey,
    template: SensorTemplate,
    /// Working point of this particular sensor (template baseline ± variance).
    baseline: f64,
    /// Accumulated drift magnitude; grows while the asset is unhealthy.
    drift: f64,
    /// Offset of a walk signal from the working point.
    level: f64,
    sequence: u64,
}

impl SensorTwin {
    fn new(key: ChannelKey, template: SensorTemplate, rng: &mut StdRng) -> Self {
        let variance = template.baseline_variance;
        let offset = if variance > 0.0 {
            rng.gen_range(-variance..=variance)
        } else {
            0.0
        };
        Self {
            key,
            baseline: template.baseline + offset,
            template,
            drift: 0.0,
            level: 0.0,
            sequence: 0,
        }
    }

    /// Bounded noise: normal with σ = amplitude/2, clamped to ±amplitude.
    fn noise(&self, rng: &mut StdRng) -> f64 {
        let amplitude = self.template.noise;
        if amplitude <= 0.0 {
            return 0.0;
        }
        Normal::new(0.0, amplitude / 2.0)
            .map(|n| n.sample(rng).clamp(-amplitude, amplitude))
            .unwrap_or(0.0)
    }

    /// Nominal reading before drift: fresh noise, or the next step of the walk.
    fn wander(&mut self, noise: f64) -> f64 {
        match self.template.signal {
            SignalShape::Steady => self.baseline + noise,
            SignalShape::Walk => {
                self.level = walk_step(
                    self.level,
                    noise,
                    self.template.walk_band,
                    self.template.walk_pull,
                );
                self.baseline + self.level
            }
        }
    }

    fn value(&mut self, mode: FaultMode, sim: &SimulationConfig, rng: &mut StdRng) -> f64 {
        let noise = self.noise(rng);
        let nominal = self.wander(noise);
        let t = &self.template;
        let dir = t.direction.sign();

        let mut value = match mode {
            FaultMode::Nominal => nominal,
            FaultMode::Degrading => {
                // Trend toward the warning threshold without reaching it on average.
                let span = (t.warning - self.baseline).abs() * sim.degrade_ceiling;
                nominal + dir * self.drift.min(span)
            }
            FaultMode::Faulted => {
                let past = t.critical + (t.critical - self.baseline) * (sim.fault_multiplier - 1.0);
                past + dir * noise.abs()
            }
        };

        if t.spike_probability > 0.0 && rng.gen::<f64>() < t.spike_probability {
            value += dir * t.spike_magnitude;
        }
        if let Some(floor) = t.floor {
            value = value.max(floor);
        }
        round_to(value, t.precision)
    }
}

/// One step of an elastically bounded random walk: add the step, then pull
/// back toward zero once outside `±band`.
fn walk_step(level: f64, step: f64, band: f64, pull: f64) -> f64 {
    let next = level + step;
    if next > band {
        next - pull
    } else if next < -band {
        next + pull
    } else {
        next
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(precision).unwrap_or(9));
    (value * factor).round() / factor
}

/// One simulated asset.
#[derive(Debug, Clone)]
struct AssetTwin {
    id: AssetId,
    mode: FaultMode,
    /// Largest failure probability among the asset's sensors; all sensors on
    /// an asset fault together.
    failure_probability: f64,
    rng: StdRng,
    sensors: Vec<SensorTwin>,
}

impl AssetTwin {
    fn step(&mut self, tick: u64, now: DateTime<Utc>, sim: &SimulationConfig) -> Vec<Reading> {
        let draw: f64 = self.rng.gen();
        let next = next_mode(self.mode, draw, self.failure_probability, sim.recovery_probability);
        if next != self.mode {
            debug!(asset = %self.id, from = %self.mode, to = %next, "Fault state transition");
            self.set_mode(next);
        }

        let mut readings = Vec::with_capacity(self.sensors.len());
        for sensor in &mut self.sensors {
            if self.mode.accumulates_drift() {
                sensor.drift += sensor.template.drift_rate;
            }
            if tick % u64::from(sensor.template.sample_every) != 0 {
                continue;
            }
            let value = sensor.value(self.mode, sim, &mut self.rng);
            sensor.sequence += 1;
            readings.push(Reading::new(sensor.key.clone(), value, now, sensor.sequence));
        }
        readings
    }

    fn set_mode(&mut self, mode: FaultMode) {
        if mode == FaultMode::Nominal {
            for sensor in &mut self.sensors {
                sensor.drift = 0.0;
            }
        }
        self.mode = mode;
    }
}

/// Produces one reading per sensor per tick.
pub struct TwinGenerator {
    assets: Vec<AssetTwin>,
    sim: SimulationConfig,
    seed: u64,
    tick: u64,
}

impl TwinGenerator {
    /// Build twins for every asset in the registry.
    ///
    /// `seed` overrides `simulation.seed`; with neither, the run is seeded
    /// from OS entropy (and the chosen seed is logged so it can be replayed).
    pub fn new(registry: &TopologyRegistry, sim: &SimulationConfig, seed: Option<u64>) -> Self {
        let seed = seed.or(sim.seed).unwrap_or_else(rand::random);

        let assets = registry
            .assets()
            .iter()
            .zip(1u64..)
            .map(|(entry, index)| {
                let mut rng = StdRng::seed_from_u64(seed ^ index.wrapping_mul(SEED_STRIDE));
                let mut failure_probability: f64 = 0.0;
                let sensors = entry
                    .sensors
                    .iter()
                    .filter_map(|sensor_type| {
                        // Templates are guaranteed by registry validation.
                        let template = registry.resolve_template(sensor_type).ok()?.clone();
                        failure_probability = failure_probability.max(template.failure_probability);
                        Some(SensorTwin::new(entry.id.sensor(sensor_type.as_str()), template, &mut rng))
                    })
                    .collect();
                AssetTwin {
                    id: entry.id.clone(),
                    mode: FaultMode::Nominal,
                    failure_probability,
                    rng,
                    sensors,
                }
            })
            .collect::<Vec<_>>();

        info!(
            assets = assets.len(),
            seed = seed,
            "[TwinGenerator] Digital twins initialized"
        );

        Self {
            assets,
            sim: sim.clone(),
            seed,
            tick: 0,
        }
    }

    /// Advance every asset by one tick, returning readings in topology order.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Reading> {
        let tick = self.tick;
        self.tick += 1;
        let sim = &self.sim;

        self.assets
            .par_iter_mut()
            .map(|asset| asset.step(tick, now, sim))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Override an asset's fault mode. Returns false for unknown assets.
    pub fn force_mode(&mut self, asset: &AssetId, mode: FaultMode) -> bool {
        match self.assets.iter_mut().find(|a| &a.id == asset) {
            Some(twin) => {
                info!(asset = %asset, mode = %mode, "[TwinGenerator] Fault mode forced");
                twin.set_mode(mode);
                true
            }
            None => false,
        }
    }

    /// Return an asset to nominal with no accumulated drift.
    pub fn reset_asset(&mut self, asset: &AssetId) -> bool {
        self.force_mode(asset, FaultMode::Nominal)
    }

    pub fn mode_of(&self, asset: &AssetId) -> Option<FaultMode> {
        self.assets.iter().find(|a| &a.id == asset).map(|a| a.mode)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn ticks_elapsed(&self) -> u64 {
        self.tick
    }

    /// Count of assets per fault mode: (nominal, degrading, faulted).
    pub fn mode_counts(&self) -> (usize, usize, usize) {
        self.assets.iter().fold((0, 0, 0), |(n, d, f), a| match a.mode {
            FaultMode::Nominal => (n + 1, d, f),
            FaultMode::Degrading => (n, d + 1, f),
            FaultMode::Faulted => (n, d, f + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlantConfig;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn registry_from(toml_str: &str) -> Arc<TopologyRegistry> {
        let config = PlantConfig::from_toml_str(toml_str).unwrap();
        Arc::new(TopologyRegistry::load(&config).unwrap())
    }

    fn single_sensor() -> Arc<TopologyRegistry> {
        registry_from(
            r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["gauge"]

[templates.gauge]
unit = "u"
baseline = 10.0
noise = 0.1
drift_rate = 0.5
warning = 15.0
critical = 20.0
hysteresis_margin = 1.0
precision = 3
"#,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn nominal_values_stay_within_noise_band() {
        let registry = single_sensor();
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(7));
        for _ in 0..500 {
            for r in gen.tick(t0()) {
                assert!((r.value - 10.0).abs() <= 0.1 + 1e-9, "value {} outside band", r.value);
            }
        }
    }

    #[test]
    fn sequence_numbers_increase_by_one() {
        let registry = single_sensor();
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(1));
        let seqs: Vec<u64> = (0..5).flat_map(|_| gen.tick(t0())).map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn faulted_asset_reads_past_critical() {
        let registry = single_sensor();
        let sim = SimulationConfig {
            recovery_probability: 0.0,
            ..SimulationConfig::default()
        };
        let mut gen = TwinGenerator::new(&registry, &sim, Some(3));
        let asset = AssetId::new("sector_1", "line_1", "asset_1");
        assert!(gen.force_mode(&asset, FaultMode::Faulted));
        for _ in 0..50 {
            let r = &gen.tick(t0())[0];
            // critical + (20 - 10) * 0.2 = 22.0 plus non-negative noise
            assert!(r.value >= 22.0 - 1e-9, "faulted value {} below 22", r.value);
        }
    }

    #[test]
    fn degrading_trends_up_but_stays_below_warning_mean() {
        let registry = single_sensor();
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(5));
        let asset = AssetId::new("sector_1", "line_1", "asset_1");
        gen.force_mode(&asset, FaultMode::Degrading);
        let first = gen.tick(t0())[0].value;
        let mut last = first;
        for _ in 0..100 {
            last = gen.tick(t0())[0].value;
        }
        assert!(last > first);
        // ceiling = 0.9 * (15 - 10) = 4.5 → mean 14.5, noise ≤ 0.1
        assert!(last < 15.0);
    }

    #[test]
    fn reset_clears_drift() {
        let registry = single_sensor();
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(5));
        let asset = AssetId::new("sector_1", "line_1", "asset_1");
        gen.force_mode(&asset, FaultMode::Degrading);
        for _ in 0..20 {
            gen.tick(t0());
        }
        assert!(gen.reset_asset(&asset));
        assert_eq!(gen.mode_of(&asset), Some(FaultMode::Nominal));
        let r = &gen.tick(t0())[0];
        assert!((r.value - 10.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn sample_every_skips_ticks() {
        let registry = registry_from(
            r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["fast", "slow"]

[templates.fast]
unit = "u"
baseline = 1.0
warning = 2.0
critical = 3.0

[templates.slow]
unit = "u"
baseline = 1.0
warning = 2.0
critical = 3.0
sample_every = 3
"#,
        );
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(9));
        let counts: Vec<usize> = (0..6).map(|_| gen.tick(t0()).len()).collect();
        assert_eq!(counts, vec![2, 1, 1, 2, 1, 1]);
    }

    #[test]
    fn floor_clamps_values() {
        let registry = registry_from(
            r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["vibration"]

[templates.vibration]
unit = "mm/s"
baseline = 0.05
noise = 0.5
warning = 4.5
critical = 7.1
floor = 0.0
"#,
        );
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(11));
        for _ in 0..200 {
            assert!(gen.tick(t0())[0].value >= 0.0);
        }
    }

    #[test]
    fn walk_step_pulls_back_outside_band() {
        assert_eq!(walk_step(0.0, 0.5, 2.0, 0.3), 0.5);
        assert!((walk_step(1.9, 0.4, 2.0, 0.3) - 2.0).abs() < 1e-12);
        assert!((walk_step(-2.0, -0.2, 2.0, 0.3) + 1.9).abs() < 1e-12);
    }

    #[test]
    fn walk_signal_wanders_inside_elastic_band() {
        let registry = registry_from(
            r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["winding"]

[templates.winding]
unit = "C"
baseline = 60.0
noise = 0.3
warning = 80.0
critical = 95.0
signal = "walk"
walk_band = 3.0
precision = 3
"#,
        );
        let mut gen = TwinGenerator::new(&registry, &SimulationConfig::default(), Some(17));
        let values: Vec<f64> = (0..5_000).map(|_| gen.tick(t0())[0].value).collect();

        // Stationary noise never leaves ±0.3; a walk does.
        assert!(values.iter().any(|v| (v - 60.0).abs() > 1.0));
        for v in &values {
            assert!((v - 60.0).abs() <= 3.0 + 0.3 + 1e-3, "value {v} escaped the band");
        }
        // Inert: consecutive readings differ by at most step + pull.
        for pair in values.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= 0.6 + 1e-3);
        }
    }

    #[test]
    fn rounding_respects_precision() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(-7.75, 1), -7.8);
    }
}
