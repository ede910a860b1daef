use std::path::{Path, PathBuf};
use std::time::Duration;

use crs_eviction::{EvictionWeights, PolicyConfig, ScoringMode};
use crs_tier::{PlacementPolicy, PromotionRule, TierManagerConfig, DEFAULT_SMALL_BINARY_THRESHOLD};
use crs_types::ContentKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("cannot serialize config: {0}")]
    Serialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where memory-pressure readings come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureSourceKind {
    /// Headroom left in the store's own memory budget.
    #[default]
    Budget,
    /// Host memory as reported by `/proc/meminfo`.
    System,
}

/// Store configuration. Every field has a default, so a TOML file only
/// needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding disk-tier payloads.
    pub disk_root: PathBuf,
    /// Shared budget of both memory pools.
    pub memory_capacity_bytes: u64,
    /// Soft cap on disk-tier bytes.
    pub disk_capacity_bytes: u64,
    /// Binary payloads below this go to the small-binary pool, the rest to disk.
    pub small_binary_threshold_bytes: u64,
    /// Text and structured payloads above this go to disk.
    pub memory_object_ceiling_bytes: u64,
    pub scoring_mode: ScoringMode,
    pub eviction_weights: EvictionWeights,
    /// Blend used while memory pressure is active.
    pub pressure_weights: EvictionWeights,
    /// Headroom fraction below which memory pressure is active.
    pub memory_pressure_threshold_fraction: f64,
    pub pressure_source: PressureSourceKind,
    /// Period of the background pressure monitor started on open. Zero
    /// leaves it off.
    pub pressure_poll_interval_ms: u64,
    /// Upper bound on threads serving timed disk reads and monitor ticks.
    pub blocking_threads: usize,
    pub min_eviction_batch_bytes: u64,
    pub pressure_min_eviction_batch_bytes: u64,
    /// New entries are shielded from normal-pass eviction for this long.
    pub min_residency_ms: u64,
    /// Reads within the window that promote a disk entry. Zero disables.
    pub promotion_access_count: u32,
    pub promotion_window_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl_secs: Option<u64>,
    /// Kinds demoted to disk instead of discarded when evicted from memory.
    pub durable_kinds: Vec<ContentKind>,
    /// Re-register payloads found under `disk_root` on open.
    pub adopt_disk_payloads: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            disk_root: PathBuf::from("crs-data"),
            memory_capacity_bytes: 256 * MIB,
            disk_capacity_bytes: 4096 * MIB,
            small_binary_threshold_bytes: DEFAULT_SMALL_BINARY_THRESHOLD,
            memory_object_ceiling_bytes: 64 * MIB,
            scoring_mode: ScoringMode::Composite,
            eviction_weights: EvictionWeights::default(),
            pressure_weights: EvictionWeights::pressure_default(),
            memory_pressure_threshold_fraction: 0.1,
            pressure_source: PressureSourceKind::Budget,
            pressure_poll_interval_ms: 1_000,
            blocking_threads: 8,
            min_eviction_batch_bytes: 0,
            pressure_min_eviction_batch_bytes: 0,
            min_residency_ms: 0,
            promotion_access_count: 3,
            promotion_window_secs: 60,
            default_ttl_secs: None,
            durable_kinds: vec![ContentKind::Text, ContentKind::Structured],
            adopt_disk_payloads: true,
        }
    }
}

impl StoreConfig {
    /// Defaults with the disk tier rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            disk_root: root.into(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_capacity_bytes == 0 {
            return Err(ConfigError::Invalid("memory_capacity_bytes must be positive".into()));
        }
        if self.disk_capacity_bytes == 0 {
            return Err(ConfigError::Invalid("disk_capacity_bytes must be positive".into()));
        }
        let threshold = self.memory_pressure_threshold_fraction;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "memory_pressure_threshold_fraction must be in (0, 1), got {threshold}"
            )));
        }
        if self.blocking_threads == 0 {
            return Err(ConfigError::Invalid("blocking_threads must be positive".into()));
        }
        check_weights("eviction_weights", &self.eviction_weights)?;
        check_weights("pressure_weights", &self.pressure_weights)?;
        Ok(())
    }

    pub fn is_durable(&self, kind: ContentKind) -> bool {
        self.durable_kinds.contains(&kind)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Monitor period, or `None` when the monitor is disabled.
    pub fn pressure_poll_interval(&self) -> Option<Duration> {
        (self.pressure_poll_interval_ms > 0)
            .then(|| Duration::from_millis(self.pressure_poll_interval_ms))
    }

    /// The tier manager's view of this configuration.
    pub fn tier_config(&self) -> TierManagerConfig {
        TierManagerConfig {
            placement: PlacementPolicy::new(
                self.small_binary_threshold_bytes,
                self.memory_object_ceiling_bytes,
            ),
            policy: PolicyConfig {
                mode: self.scoring_mode,
                weights: self.eviction_weights,
                pressure_weights: self.pressure_weights,
                min_batch_bytes: self.min_eviction_batch_bytes,
                pressure_min_batch_bytes: self.pressure_min_eviction_batch_bytes,
                min_residency_ms: self.min_residency_ms,
            },
            promotion: PromotionRule {
                access_count: self.promotion_access_count,
                window_ms: self.promotion_window_secs.saturating_mul(1_000),
            },
            pressure_threshold: self.memory_pressure_threshold_fraction,
        }
    }
}

fn check_weights(name: &str, weights: &EvictionWeights) -> Result<(), ConfigError> {
    let valid = |w: f64| w.is_finite() && w >= 0.0;
    if !valid(weights.recency) || !valid(weights.frequency) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be finite and non-negative"
        )));
    }
    if weights.recency + weights.frequency == 0.0 {
        return Err(ConfigError::Invalid(format!("{name} must not both be zero")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = StoreConfig::default();
        c.validate().unwrap();
        assert_eq!(c.small_binary_threshold_bytes, 1024 * 1024);
        assert_eq!(c.eviction_weights, EvictionWeights::new(0.5, 0.5));
        assert!(c.is_durable(ContentKind::Text));
        assert!(c.is_durable(ContentKind::Structured));
        assert!(!c.is_durable(ContentKind::Binary));
        assert!(c.default_ttl().is_none());
        assert!(c.adopt_disk_payloads);
        assert_eq!(c.pressure_source, PressureSourceKind::Budget);
        assert_eq!(c.pressure_poll_interval(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn pressure_monitor_settings_parse() {
        let c = StoreConfig::from_toml_str(
            r#"
            pressure_source = "system"
            pressure_poll_interval_ms = 0
            blocking_threads = 2
            "#,
        )
        .unwrap();
        assert_eq!(c.pressure_source, PressureSourceKind::System);
        assert_eq!(c.pressure_poll_interval(), None);
        assert_eq!(c.blocking_threads, 2);

        let err = StoreConfig::from_toml_str(r#"pressure_source = "cgroup""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_blocking_threads() {
        let c = StoreConfig {
            blocking_threads: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StoreConfig::from_toml_str(
            r#"
            disk_root = "/var/lib/crs"
            memory_capacity_bytes = 1048576
            scoring_mode = "lfu"
            default_ttl_secs = 30
            durable_kinds = ["binary"]

            [eviction_weights]
            recency = 0.7
            frequency = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(c.disk_root, PathBuf::from("/var/lib/crs"));
        assert_eq!(c.memory_capacity_bytes, 1_048_576);
        assert_eq!(c.scoring_mode, ScoringMode::Lfu);
        assert_eq!(c.default_ttl(), Some(Duration::from_secs(30)));
        assert!(c.is_durable(ContentKind::Binary));
        assert!(!c.is_durable(ContentKind::Text));
        assert_eq!(c.eviction_weights, EvictionWeights::new(0.7, 0.3));
        assert_eq!(c.disk_capacity_bytes, StoreConfig::default().disk_capacity_bytes);
    }

    #[test]
    fn toml_round_trip() {
        let mut c = StoreConfig::with_root("/tmp/crs");
        c.default_ttl_secs = Some(90);
        let text = c.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn unset_ttl_is_omitted() {
        let text = StoreConfig::default().to_toml_string().unwrap();
        assert!(!text.contains("default_ttl_secs"));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let err = StoreConfig::from_toml_str(r#"durable_kinds = ["video"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let c = StoreConfig {
            memory_capacity_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        for threshold in [0.0, 1.0, -0.5, f64::NAN] {
            let c = StoreConfig {
                memory_pressure_threshold_fraction: threshold,
                ..Default::default()
            };
            assert!(c.validate().is_err(), "threshold {threshold} accepted");
        }
    }

    #[test]
    fn rejects_bad_weights() {
        let zero = StoreConfig {
            eviction_weights: EvictionWeights::new(0.0, 0.0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let negative = StoreConfig {
            pressure_weights: EvictionWeights::new(-1.0, 2.0),
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crs.toml");
        std::fs::write(&path, "promotion_access_count = 5\n").unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap().promotion_access_count, 5);

        let missing = StoreConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn tier_config_carries_settings() {
        let c = StoreConfig {
            promotion_window_secs: 2,
            min_residency_ms: 250,
            ..Default::default()
        };
        let t = c.tier_config();
        assert_eq!(t.promotion.window_ms, 2_000);
        assert_eq!(t.policy.min_residency_ms, 250);
        assert_eq!(t.placement.small_binary_threshold, c.small_binary_threshold_bytes);
    }
}
