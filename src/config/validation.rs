//! Config validation: unknown-key detection with Levenshtein suggestions
//!
//! Two-pass parse: the raw TOML is first read into a `toml::Value`, its key
//! tree is walked and compared against the known field names, and warnings
//! are emitted with "did you mean?" suggestions. Normal serde
//! deserialization follows. Warnings never reject a config.
//!
//! Keys under `capability.spec_limits` are parameter names chosen by the
//! operator; only their `lsl`/`usl` leaves are checked.

use std::collections::BTreeSet;

/// A non-fatal config warning.
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

const SPEC_LIMITS_PREFIX: &str = "capability.spec_limits";

/// Placeholder for an operator-chosen parameter name.
const PARAMETER_WILDCARD: &str = "<parameter>";

/// Every valid dotted key path for `LinewatchConfig`.
///
/// Maintained by hand to match the structs in linewatch_config.rs.
pub fn known_config_keys() -> BTreeSet<&'static str> {
    [
        // [line]
        "line",
        "line.name",
        "line.site",
        // [control_limits]
        "control_limits",
        "control_limits.n_sigma",
        // [capability]
        "capability",
        "capability.spec_limits",
        "capability.spec_limits.<parameter>",
        "capability.spec_limits.<parameter>.lsl",
        "capability.spec_limits.<parameter>.usl",
        // [anomaly]
        "anomaly",
        "anomaly.default_threshold",
        "anomaly.default_sensitivity",
        "anomaly.window_hours",
        "anomaly.monitor_interval_secs",
        // [forecast]
        "forecast",
        "forecast.horizon_days",
        "forecast.min_samples",
        "forecast.exploratory_min_samples",
        "forecast.fit_budget_ms",
        // [storage]
        "storage",
        "storage.path",
        // [source]
        "source",
        "source.csv_path",
        "source.timestamp_column",
    ]
    .into_iter()
    .collect()
}

/// Replace the parameter segment under `capability.spec_limits` with the wildcard.
fn normalize_key(key: &str) -> String {
    match key.strip_prefix(SPEC_LIMITS_PREFIX) {
        Some(rest) if rest.starts_with('.') => {
            let mut parts = rest[1..].splitn(2, '.');
            let _parameter = parts.next();
            match parts.next() {
                Some(leaf) => format!("{SPEC_LIMITS_PREFIX}.{PARAMETER_WILDCARD}.{leaf}"),
                None => format!("{SPEC_LIMITS_PREFIX}.{PARAMETER_WILDCARD}"),
            }
        }
        _ => key.to_string(),
    }
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect the dotted key paths of a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
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

// ============================================================================
// Levenshtein Distance
// ============================================================================

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

/// Closest known key within edit distance 3; the first in key order wins ties.
pub fn suggest_correction(unknown: &str, known: &BTreeSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 && best.map_or(true, |(_, d)| dist < d) {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every unknown key in a raw TOML string.
///
/// Unparseable input yields no warnings; serde reports it afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter_map(|key| {
            let normalized = normalize_key(&key);
            if known.contains(normalized.as_str()) {
                return None;
            }
            let suggestion = suggest_correction(&normalized, &known).map(|s| {
                // Put the operator's parameter name back into the suggestion.
                if normalized != key {
                    let parameter = key
                        .trim_start_matches(SPEC_LIMITS_PREFIX)
                        .trim_start_matches('.')
                        .split('.')
                        .next()
                        .unwrap_or_default();
                    s.replace(PARAMETER_WILDCARD, parameter)
                } else {
                    s
                }
            });
            Some(ValidationWarning {
                message: format!("Unknown config key '{key}'"),
                field: key,
                suggestion,
            })
        })
        .collect()
}
