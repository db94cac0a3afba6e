//! Block store configuration.
//!
//! ```toml
//! [[tier]]
//! alias = 1
//! dirs = [{ path = "/mnt/ramdisk", capacity = "1GB" }]
//!
//! [[tier]]
//! alias = 3
//! dirs = [{ path = "/disk1", capacity = "3GB" }, { path = "/disk2", capacity = "5GB" }]
//!
//! [evictor]
//! strategy = "lru"
//! ```

use crate::eviction::{
    DEFAULT_ATTENUATION_FACTOR, DEFAULT_STEP_FACTOR, EvictorConfig, EvictorKind,
};
use crate::location::TierAlias;
use crate::meta::TierSpec;
use crate::store::{DEFAULT_PLAN_RETRIES, TieredBlockStore};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Block store configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Storage tiers, fastest first.
    #[serde(default)]
    pub tier: Vec<TierConfig>,

    /// Eviction strategy.
    #[serde(default)]
    pub evictor: EvictorSection,

    /// Block store behavior.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the layout and evictor options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tier.is_empty() {
            return Err(ConfigError::Invalid("at least one tier is required".into()));
        }

        let mut aliases = HashSet::new();
        let mut prev_level = None;
        for (index, tier) in self.tier.iter().enumerate() {
            if !aliases.insert(tier.alias) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate tier alias {}",
                    tier.alias
                )));
            }
            let level = tier.level(index);
            if prev_level.is_some_and(|prev| level <= prev) {
                return Err(ConfigError::Invalid(format!(
                    "tier {} level {} must be greater than the previous tier's",
                    tier.alias, level
                )));
            }
            prev_level = Some(level);
            if tier.dirs.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tier {} has no dirs",
                    tier.alias
                )));
            }
        }

        self.logging.validate()?;
        self.evictor_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Tier layout for the metadata manager.
    pub fn tier_specs(&self) -> Vec<TierSpec> {
        self.tier
            .iter()
            .enumerate()
            .map(|(index, tier)| {
                tier.dirs.iter().fold(
                    TierSpec::new(tier.alias, tier.level(index)),
                    |spec, dir| spec.with_dir(dir.path.clone(), dir.capacity),
                )
            })
            .collect()
    }

    /// Evictor options.
    pub fn evictor_config(&self) -> EvictorConfig {
        EvictorConfig::new(self.evictor.strategy.into())
            .with_cascading(self.evictor.cascading)
            .with_step_factor(self.evictor.step_factor)
            .with_attenuation_factor(self.evictor.attenuation_factor)
    }

    /// Build a block store with the configured layout, evictor and retries.
    pub fn build_store(&self) -> crate::BlockStoreResult<TieredBlockStore> {
        TieredBlockStore::builder(self.tier_specs())
            .evictor(self.evictor_config())
            .plan_retries(self.store.plan_retries)
            .build()
    }
}

/// One storage tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    /// Stable tier identity.
    pub alias: TierAlias,

    /// Position in the hierarchy. Defaults to the tier's index.
    #[serde(default)]
    pub level: Option<u32>,

    /// Directories of this tier.
    pub dirs: Vec<DirConfig>,
}

impl TierConfig {
    fn level(&self, index: usize) -> u32 {
        self.level.unwrap_or(index as u32)
    }
}

/// One storage directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirConfig {
    /// Directory path.
    pub path: PathBuf,

    /// Capacity in bytes (e.g. 1073741824, "1GB", "512MB").
    #[serde(deserialize_with = "deserialize_size")]
    pub capacity: u64,
}

/// Eviction strategy name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictorStrategy {
    /// Least recently used.
    #[default]
    Lru,
    /// Greedy by block id.
    Greedy,
    /// Least recently/frequently used.
    Lrfu,
}

impl From<EvictorStrategy> for EvictorKind {
    fn from(strategy: EvictorStrategy) -> Self {
        match strategy {
            EvictorStrategy::Lru => EvictorKind::Lru,
            EvictorStrategy::Greedy => EvictorKind::Greedy,
            EvictorStrategy::Lrfu => EvictorKind::Lrfu,
        }
    }
}

/// Evictor section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvictorSection {
    /// Strategy: "lru", "greedy" or "lrfu".
    #[serde(default)]
    pub strategy: EvictorStrategy,

    /// Move victims to lower tiers instead of evicting them (lru, lrfu).
    #[serde(default)]
    pub cascading: bool,

    /// LRFU step factor.
    #[serde(default = "EvictorSection::default_step_factor")]
    pub step_factor: f64,

    /// LRFU attenuation factor.
    #[serde(default = "EvictorSection::default_attenuation_factor")]
    pub attenuation_factor: f64,
}

impl Default for EvictorSection {
    fn default() -> Self {
        Self {
            strategy: EvictorStrategy::default(),
            cascading: false,
            step_factor: Self::default_step_factor(),
            attenuation_factor: Self::default_attenuation_factor(),
        }
    }
}

impl EvictorSection {
    fn default_step_factor() -> f64 {
        DEFAULT_STEP_FACTOR
    }

    fn default_attenuation_factor() -> f64 {
        DEFAULT_ATTENUATION_FACTOR
    }
}

/// Block store section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// How many times a stale eviction plan is recomputed.
    #[serde(default = "StoreConfig::default_plan_retries")]
    pub plan_retries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            plan_retries: Self::default_plan_retries(),
        }
    }
}

impl StoreConfig {
    fn default_plan_retries() -> usize {
        DEFAULT_PLAN_RETRIES
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-field human-readable lines with thread names.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line output without targets.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Level for block store events: "error", "warn", "info", "debug" or "trace".
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.level
            .parse::<tracing::Level>()
            .map(|_| ())
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.level)))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not valid TOML for this schema.
    Parse(toml::de::Error),
    /// The values are inconsistent.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(u64),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(D::Error::custom),
    }
}

/// Parse a size string like "64MB", "4GB", "1TB" into bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&s[..idx], s[idx..].to_uppercase()),
        None => (s, String::new()),
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown size suffix: {}", suffix)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size overflow".to_string())
}

/// Annotated default configuration.
pub const DEFAULT_CONFIG: &str = r#"# Tiered block store configuration

# Tiers are listed fastest first. Level defaults to the tier's position.
[[tier]]
alias = 1
dirs = [{ path = "/mnt/ramdisk", capacity = "1GB" }]

[[tier]]
alias = 3
dirs = [
    { path = "/mnt/disk1", capacity = "3GB" },
    { path = "/mnt/disk2", capacity = "5GB" },
]

[evictor]
# Strategy: "lru", "greedy", or "lrfu"
strategy = "lru"
# Move victims to the next tier instead of evicting them (lru, lrfu)
cascading = false
# LRFU decay: crf = crf * (1 / attenuation_factor) ^ (step_factor * elapsed) + 1
step_factor = 0.25
attenuation_factor = 2.0

[store]
# Times a stale eviction plan is recomputed before giving up
plan_retries = 3

[logging]
# Level for block store events: "error", "warn", "info", "debug", "trace"
# Other crates log at "warn". RUST_LOG replaces the whole filter
level = "info"
# Log format: "pretty" (human-readable), "json", or "compact"
format = "pretty"
"#;
