//! System-wide default constants.
//!
//! Every tunable knob in `twinpulse.toml` falls back to one of these.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Simulation
// ============================================================================

/// Generator tick period (ms).
pub const SIMULATION_INTERVAL_MS: u64 = 1_000;

/// Per-tick probability that a faulted asset recovers to nominal.
///
/// Kept well below typical failure probabilities so faults persist long
/// enough to be observed downstream.
pub const RECOVERY_PROBABILITY: f64 = 0.02;

/// How far past the critical threshold a faulted asset is pushed.
///
/// `value = critical + (critical - baseline) * (multiplier - 1)`
pub const FAULT_MULTIPLIER: f64 = 1.2;

/// Fraction of the baseline-to-warning span a degrading asset may drift.
pub const DEGRADE_CEILING: f64 = 0.9;

// ============================================================================
// Publisher
// ============================================================================

/// Publish attempts per reading before it is dropped.
pub const PUBLISH_MAX_ATTEMPTS: u32 = 4;

/// First retry delay (ms). Doubles on every further attempt.
pub const PUBLISH_INITIAL_BACKOFF_MS: u64 = 25;

/// Backoff ceiling (ms).
pub const PUBLISH_MAX_BACKOFF_MS: u64 = 400;

/// Capacity of the in-process bus between publisher and pipeline (messages).
pub const BUS_CAPACITY: usize = 8_192;

// ============================================================================
// Pipeline
// ============================================================================

/// Accepted clock skew between a reading's timestamp and pipeline time (s).
///
/// Generous on purpose: simulator and pipeline hosts drift.
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

// ============================================================================
// Alarm Engine
// ============================================================================

/// Hysteresis margin as a fraction of `|critical - warning|`, used when a
/// template does not set `hysteresis_margin` explicitly.
pub const DEFAULT_MARGIN_RATIO: f64 = 0.1;

// ============================================================================
// Storage / Notifier
// ============================================================================

/// Default sled database directory.
pub const STORAGE_PATH: &str = "./data/readings";

/// HTTP timeout for webhook notifications (ms).
pub const WEBHOOK_TIMEOUT_MS: u64 = 5_000;
