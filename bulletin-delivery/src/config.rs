use std::{collections::BTreeMap, time::Duration};

use bulletin_source::{DEFAULT_SOURCE, SourceRegistry, SourceSettings};
use serde::Deserialize;

use crate::error::ConfigError;

const fn default_throttle() -> usize {
    20
}

const fn default_use_cron() -> bool {
    true
}

const fn default_tick_interval() -> u64 {
    60
}

const fn default_test_recipients_max() -> usize {
    10
}

/// Dispatcher configuration
///
/// ```ron
/// dispatch: (
///     throttle: 20,
///     use_cron: true,
///     tick_interval_secs: 60,
///     time_budget_secs: Some(50),
///     content_sources: { "article": "entity" },
///     source: ( site_name: "Example News" ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum rows processed per tick. Failed sends count against it too.
    #[serde(default = "default_throttle")]
    pub throttle: usize,

    /// Send from the periodic scheduler. When off, queueing an issue sends
    /// it immediately, in one unbounded tick.
    #[serde(default = "default_use_cron")]
    pub use_cron: bool,

    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Wall-clock budget for one tick; rows not reached are released
    #[serde(default)]
    pub time_budget_secs: Option<u64>,

    /// Maximum addresses accepted by a test send
    #[serde(default = "default_test_recipients_max")]
    pub test_recipients_max: usize,

    /// Message source strategy per issue content type
    #[serde(default)]
    pub content_sources: BTreeMap<String, String>,

    #[serde(default)]
    pub source: SourceSettings,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            throttle: default_throttle(),
            use_cron: default_use_cron(),
            tick_interval_secs: default_tick_interval(),
            time_budget_secs: None,
            test_recipients_max: default_test_recipients_max(),
            content_sources: BTreeMap::new(),
            source: SourceSettings::default(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    /// Source strategy for a content type, the entity source when unmapped
    #[must_use]
    pub fn source_for(&self, content_type: &str) -> &str {
        self.content_sources
            .get(content_type)
            .map_or(DEFAULT_SOURCE, String::as_str)
    }

    /// Check values and strategy names against the registry
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self, sources: &SourceRegistry) -> Result<(), ConfigError> {
        if self.throttle == 0 {
            return Err(ConfigError::Invalid {
                field: "throttle",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some((content_type, name)) = self
            .content_sources
            .iter()
            .find(|(_, name)| !sources.contains(name))
        {
            return Err(ConfigError::UnknownSource {
                content_type: content_type.clone(),
                name: name.clone(),
            });
        }

        Ok(())
    }
}
