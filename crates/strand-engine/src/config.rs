//! Thread pool configuration and feature toggles
//!
//! Features select between alternative pool policies. None of them changes
//! ordering or shutdown guarantees.

use crate::error::ConfigError;
use std::time::Duration;

/// Idle time after which a worker is reclaimed
pub const DEFAULT_RECLAIM_TIME: Duration = Duration::from_secs(30);

/// Idle reclaim time under `UseFiveMinutesThreadReclaimTime`
pub const LONG_RECLAIM_TIME: Duration = Duration::from_secs(5 * 60);

/// How long a may-block call must last before the pool compensates for it,
/// when `MayBlockWithoutDelay` is off
pub const DEFAULT_MAY_BLOCK_THRESHOLD: Duration = Duration::from_millis(10);

/// Environment variable read by [`Features::from_env`]
pub const FEATURES_ENV_VAR: &str = "STRAND_FEATURES";

/// Feature toggles
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Features {
    /// Run every task at `UserBlocking` priority
    pub all_tasks_user_blocking: bool,
    /// Never reclaim idle workers below the initial capacity
    pub no_detach_below_initial_capacity: bool,
    /// Compensate for may-block calls immediately instead of after a threshold
    pub may_block_without_delay: bool,
    /// Reclaim idle workers after 5 minutes instead of 30 seconds
    pub use_five_minutes_thread_reclaim_time: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            all_tasks_user_blocking: false,
            no_detach_below_initial_capacity: true,
            may_block_without_delay: true,
            use_five_minutes_thread_reclaim_time: false,
        }
    }
}

impl Features {
    /// Feature names accepted by [`Features::parse`]
    pub const NAMES: [&'static str; 4] = [
        "AllTasksUserBlocking",
        "NoDetachBelowInitialCapacity",
        "MayBlockWithoutDelay",
        "UseFiveMinutesThreadReclaimTime",
    ];

    /// Parse a comma separated list on top of the defaults.
    ///
    /// `Name` enables a feature, `-Name` disables it. Whitespace and empty
    /// items are ignored.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut features = Self::default();
        features.apply(list)?;
        Ok(features)
    }

    /// Apply a feature list to these features
    pub fn apply(&mut self, list: &str) -> Result<(), ConfigError> {
        for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (name, enabled) = match item.strip_prefix('-') {
                Some(name) => (name, false),
                None => (item, true),
            };
            self.set(name, enabled)?;
        }
        Ok(())
    }

    /// Defaults overridden by the `STRAND_FEATURES` environment variable
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(FEATURES_ENV_VAR) {
            Ok(list) => Self::parse(&list),
            Err(_) => Ok(Self::default()),
        }
    }

    fn set(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let flag = match name {
            "AllTasksUserBlocking" => &mut self.all_tasks_user_blocking,
            "NoDetachBelowInitialCapacity" => &mut self.no_detach_below_initial_capacity,
            "MayBlockWithoutDelay" => &mut self.may_block_without_delay,
            "UseFiveMinutesThreadReclaimTime" => &mut self.use_five_minutes_thread_reclaim_time,
            other => return Err(ConfigError::UnknownFeature(other.to_string())),
        };
        *flag = enabled;
        Ok(())
    }
}

/// How the pool reacts to a task entering a may-block call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum MayBlockPolicy {
    /// Raise capacity as soon as the call starts
    WithoutDelay,
    /// Raise capacity if the call is still blocked after the threshold
    Threshold(Duration),
}

/// Thread pool configuration
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Maximum number of tasks running concurrently, not counting
    /// compensation for blocked tasks
    pub max_threads: usize,

    /// Idle workers are not reclaimed below this count
    pub initial_capacity: usize,

    /// Prefix for worker thread names
    pub thread_name_prefix: String,

    /// Delay before compensating for a may-block call, when
    /// `MayBlockWithoutDelay` is off
    pub may_block_threshold: Duration,

    /// Overrides the reclaim time derived from the features
    pub reclaim_time: Option<Duration>,

    /// Feature toggles
    pub features: Features,
}

impl ThreadPoolConfig {
    /// Configuration with `max_threads` threads and the same initial capacity
    pub fn with_max_threads(max_threads: usize) -> Self {
        Self {
            max_threads,
            initial_capacity: max_threads,
            ..Self::default()
        }
    }

    /// Default configuration with features read from `STRAND_FEATURES`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            features: Features::from_env()?,
            ..Self::default()
        })
    }

    /// Set the initial capacity
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the may-block threshold
    pub fn with_may_block_threshold(mut self, threshold: Duration) -> Self {
        self.may_block_threshold = threshold;
        self
    }

    /// Override the idle reclaim time
    pub fn with_reclaim_time(mut self, reclaim_time: Duration) -> Self {
        self.reclaim_time = Some(reclaim_time);
        self
    }

    /// Set the feature toggles
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Idle time after which a worker is reclaimed
    pub fn reclaim_time(&self) -> Duration {
        match self.reclaim_time {
            Some(reclaim_time) => reclaim_time,
            None if self.features.use_five_minutes_thread_reclaim_time => LONG_RECLAIM_TIME,
            None => DEFAULT_RECLAIM_TIME,
        }
    }

    /// Workers are never reclaimed below this count
    pub(crate) fn reclaim_floor(&self) -> usize {
        if self.features.no_detach_below_initial_capacity {
            self.initial_capacity.max(1)
        } else {
            1
        }
    }

    pub(crate) fn may_block_policy(&self) -> MayBlockPolicy {
        if self.features.may_block_without_delay {
            MayBlockPolicy::WithoutDelay
        } else {
            MayBlockPolicy::Threshold(self.may_block_threshold)
        }
    }

    /// Check the configuration for inconsistencies
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.initial_capacity > self.max_threads {
            return Err(ConfigError::InvalidCapacity {
                initial: self.initial_capacity,
                max: self.max_threads,
            });
        }
        Ok(())
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        let max_threads = num_cpus::get().max(1);
        Self {
            max_threads,
            initial_capacity: max_threads,
            thread_name_prefix: "strand".to_string(),
            may_block_threshold: DEFAULT_MAY_BLOCK_THRESHOLD,
            reclaim_time: None,
            features: Features::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_features() {
        let features = Features::default();
        assert!(!features.all_tasks_user_blocking);
        assert!(features.no_detach_below_initial_capacity);
        assert!(features.may_block_without_delay);
        assert!(!features.use_five_minutes_thread_reclaim_time);
    }

    #[test]
    fn test_parse_features() {
        let features =
            Features::parse("AllTasksUserBlocking, -MayBlockWithoutDelay,,UseFiveMinutesThreadReclaimTime")
                .unwrap();
        assert!(features.all_tasks_user_blocking);
        assert!(!features.may_block_without_delay);
        assert!(features.use_five_minutes_thread_reclaim_time);
        assert!(features.no_detach_below_initial_capacity);
    }

    #[test]
    fn test_parse_unknown_feature() {
        let err = Features::parse("UseNativeThreadPool").unwrap_err();
        assert_eq!(err, ConfigError::UnknownFeature("UseNativeThreadPool".to_string()));
    }

    #[test]
    fn test_every_name_parses() {
        for name in Features::NAMES {
            assert!(Features::parse(name).is_ok(), "{} should parse", name);
        }
    }

    #[test]
    fn test_reclaim_time() {
        let config = ThreadPoolConfig::with_max_threads(2);
        assert_eq!(config.reclaim_time(), DEFAULT_RECLAIM_TIME);

        let features = Features::parse("UseFiveMinutesThreadReclaimTime").unwrap();
        let config = config.with_features(features);
        assert_eq!(config.reclaim_time(), LONG_RECLAIM_TIME);

        let config = config.with_reclaim_time(Duration::from_millis(5));
        assert_eq!(config.reclaim_time(), Duration::from_millis(5));
    }

    #[test]
    fn test_may_block_policy() {
        let config = ThreadPoolConfig::with_max_threads(2);
        assert_eq!(config.may_block_policy(), MayBlockPolicy::WithoutDelay);

        let config = config
            .with_features(Features::parse("-MayBlockWithoutDelay").unwrap())
            .with_may_block_threshold(Duration::from_millis(20));
        assert_eq!(
            config.may_block_policy(),
            MayBlockPolicy::Threshold(Duration::from_millis(20))
        );
    }

    #[test]
    fn test_reclaim_floor() {
        let config = ThreadPoolConfig::with_max_threads(8).with_initial_capacity(2);
        assert_eq!(config.reclaim_floor(), 2);

        let config = config.with_features(Features::parse("-NoDetachBelowInitialCapacity").unwrap());
        assert_eq!(config.reclaim_floor(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(ThreadPoolConfig::default().validate().is_ok());
        assert_eq!(
            ThreadPoolConfig::with_max_threads(0).validate(),
            Err(ConfigError::ZeroThreads)
        );
        assert_eq!(
            ThreadPoolConfig::with_max_threads(2)
                .with_initial_capacity(3)
                .validate(),
            Err(ConfigError::InvalidCapacity { initial: 3, max: 2 })
        );
    }
}
