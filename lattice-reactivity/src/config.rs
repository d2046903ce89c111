//! Runtime Configuration
//!
//! Knobs that change how the reactivity engine behaves on the current
//! thread. The engine is single-threaded, so every thread carries its own
//! copy, seeded from [`Config::default`].

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default threshold for the scheduler's runaway-loop guard.
pub const MAX_UPDATE_COUNT: u32 = 100;

/// Reactivity engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Development mode: emit diagnostics and run the infinite-loop guard.
    pub dev: bool,

    /// Batch triggered watchers and flush them on the next tick.
    ///
    /// When off, every trigger flushes inline and subjects notify their
    /// subscribers in creation order.
    pub async_flush: bool,

    /// How many times one watcher may re-trigger itself within a single
    /// flush before it is abandoned.
    pub max_update_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev: cfg!(debug_assertions),
            async_flush: true,
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

thread_local! {
    static CURRENT: Cell<Option<Config>> = const { Cell::new(None) };
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The configuration active on this thread.
    pub fn current() -> Self {
        CURRENT.with(|current| current.get().unwrap_or_default())
    }
}

/// Replace this thread's configuration.
pub fn set(config: Config) {
    CURRENT.with(|current| current.set(Some(config)));
}

/// Modify this thread's configuration in place.
pub fn update<F>(f: F)
where
    F: FnOnce(&mut Config),
{
    let mut config = Config::current();
    f(&mut config);
    set(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_build_profile() {
        let config = Config::default();
        assert_eq!(config.dev, cfg!(debug_assertions));
        assert!(config.async_flush);
        assert_eq!(config.max_update_count, MAX_UPDATE_COUNT);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "async_flush": false }"#).unwrap();
        assert!(!config.async_flush);
        assert_eq!(config.max_update_count, MAX_UPDATE_COUNT);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = Config::from_json("{ async_flush: }").unwrap_err();
        assert!(err.to_string().starts_with("invalid reactivity config"));
    }

    #[test]
    fn update_is_thread_local() {
        update(|config| config.max_update_count = 3);
        assert_eq!(Config::current().max_update_count, 3);

        let other = std::thread::spawn(|| Config::current().max_update_count)
            .join()
            .unwrap();
        assert_eq!(other, MAX_UPDATE_COUNT);
    }
}
