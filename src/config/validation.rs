//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Unknown keys never break a config.

use std::collections::HashSet;

use super::SignalShape;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Placeholder standing in for a user-chosen sensor type name.
const TEMPLATE_WILDCARD: &str = "*";

/// Returns the complete set of valid dotted key paths for PlantConfig.
///
/// Template names are user-defined, so their paths use `*` in place of the
/// sensor type. Arrays of tables (`topology.sectors`) are not walked.
/// Any new field added to PlantConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [plant]
        "plant",
        "plant.name",
        // [simulation]
        "simulation",
        "simulation.interval_ms",
        "simulation.seed",
        "simulation.recovery_probability",
        "simulation.fault_multiplier",
        "simulation.degrade_ceiling",
        // [publisher]
        "publisher",
        "publisher.max_attempts",
        "publisher.initial_backoff_ms",
        "publisher.max_backoff_ms",
        "publisher.bus_capacity",
        // [pipeline]
        "pipeline",
        "pipeline.max_clock_skew_secs",
        // [alarm]
        "alarm",
        "alarm.default_margin_ratio",
        // [storage]
        "storage",
        "storage.kind",
        "storage.path",
        // [notifier]
        "notifier",
        "notifier.kind",
        "notifier.webhook_url",
        "notifier.timeout_ms",
        // [topology]
        "topology",
        "topology.sectors",
        "topology.generated",
        "topology.generated.sectors",
        "topology.generated.lines_per_sector",
        "topology.generated.assets_per_line",
        "topology.generated.sensors",
        // [templates.<type>]
        "templates",
        "templates.*",
        "templates.*.unit",
        "templates.*.baseline",
        "templates.*.noise",
        "templates.*.drift_rate",
        "templates.*.warning",
        "templates.*.critical",
        "templates.*.direction",
        "templates.*.hysteresis_margin",
        "templates.*.failure_probability",
        "templates.*.baseline_variance",
        "templates.*.spike_probability",
        "templates.*.spike_magnitude",
        "templates.*.floor",
        "templates.*.precision",
        "templates.*.sample_every",
        "templates.*.signal",
        "templates.*.walk_band",
        "templates.*.walk_pull",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Replace the sensor type in `templates.<type>...` with the wildcard.
fn normalize_key(key: &str) -> String {
    let mut parts: Vec<&str> = key.split('.').collect();
    if parts.len() >= 2 && parts[0] == "templates" {
        parts[1] = TEMPLATE_WILDCARD;
    }
    parts.join(".")
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Equally close keys resolve to the alphabetically first one.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|&(dist, _)| dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys never fail loading; they only warn.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        let normalized = normalize_key(&key);
        if known.contains(normalized.as_str()) {
            continue;
        }
        let suggestion = suggest_correction(&normalized, &known).map(|s| {
            // Put the user's sensor type back into the suggested path.
            let mut parts: Vec<String> = s.split('.').map(str::to_string).collect();
            if let (Some(first), Some(name)) = (parts.first(), key.split('.').nth(1)) {
                if first == "templates" && parts.len() >= 2 {
                    parts[1] = name.to_string();
                }
            }
            parts.join(".")
        });
        warnings.push(ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            field: key,
            suggestion,
        });
    }

    warnings
}

// ============================================================================
// Plausibility Validation
// ============================================================================

/// Plausibility checks on a parsed PlantConfig.
///
/// Returns (errors, warnings). Errors make the config unusable; warnings
/// are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &super::PlantConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.pipeline.max_clock_skew_secs == 0 {
        errors.push("pipeline.max_clock_skew_secs must be > 0 or every reading is rejected".to_string());
    }

    if config.simulation.interval_ms > 0 && config.simulation.interval_ms < 10 {
        warnings.push(ValidationWarning {
            field: "simulation.interval_ms".to_string(),
            message: format!(
                "simulation.interval_ms = {} is very short; publishing may not keep up",
                config.simulation.interval_ms
            ),
            suggestion: None,
        });
    }

    if config.publisher.max_backoff_ms >= config.simulation.interval_ms {
        warnings.push(ValidationWarning {
            field: "publisher.max_backoff_ms".to_string(),
            message: format!(
                "publisher.max_backoff_ms ({}) >= tick interval ({} ms); retries will be cut short by the tick deadline",
                config.publisher.max_backoff_ms, config.simulation.interval_ms
            ),
            suggestion: None,
        });
    }

    let ratio = config.alarm.default_margin_ratio;
    for (name, t) in &config.templates {
        if !(t.warning.is_finite() && t.critical.is_finite() && t.baseline.is_finite()) {
            continue; // reported by the template checks
        }
        let gap = (t.critical - t.warning).abs();
        let margin = t.margin(ratio);
        if margin.is_finite() && margin >= gap && gap > 0.0 {
            warnings.push(ValidationWarning {
                field: format!("templates.{name}.hysteresis_margin"),
                message: format!(
                    "templates.{name}: margin ({margin}) >= threshold gap ({gap}); critical can only clear straight to normal"
                ),
                suggestion: None,
            });
        }
        let headroom = (t.warning - t.baseline).abs();
        let excursion = t.excursion();
        if excursion.is_finite() && headroom > 0.0 && excursion >= headroom {
            let field = match t.signal {
                SignalShape::Steady => "noise",
                SignalShape::Walk => "walk_band",
            };
            warnings.push(ValidationWarning {
                field: format!("templates.{name}.{field}"),
                message: format!(
                    "templates.{name}: nominal excursion ({excursion}) reaches the warning threshold from baseline; expect nuisance alarms"
                ),
                suggestion: None,
            });
        }
        if t.failure_probability > 0.1 {
            warnings.push(ValidationWarning {
                field: format!("templates.{name}.failure_probability"),
                message: format!(
                    "templates.{name}.failure_probability = {} means assets fault within a few ticks",
                    t.failure_probability
                ),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}
