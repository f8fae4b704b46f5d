//! Pipeline configuration.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;

pub const ENV_THREADS: &str = "BSHUF_THREADS";
pub const ENV_BACKEND: &str = "BSHUF_BACKEND";
pub const ENV_BLOCK_SIZE: &str = "BSHUF_BLOCK_SIZE";

/// Knobs for a [`Bitshuffle`](crate::Bitshuffle) context. Every field is
/// optional; `None` means "pick a sensible default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for block-parallel work. `None` uses one per core,
    /// `Some(1)` runs every block on the calling thread.
    pub threads: Option<usize>,
    /// Force a backend. An unavailable one degrades to the next narrower.
    pub backend: Option<Backend>,
    /// Block size in elements used when the caller passes 0.
    pub block_size: Option<usize>,
}

impl PipelineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Defaults overlaid with `BSHUF_THREADS`, `BSHUF_BACKEND` and
    /// `BSHUF_BLOCK_SIZE`. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = PipelineConfig::default();

        if let Some(raw) = lookup(ENV_THREADS) {
            match raw.trim().parse::<usize>() {
                Ok(t) if t > 0 => config.threads = Some(t),
                _ => warn!("ignoring {ENV_THREADS}={raw:?}: expected a positive integer"),
            }
        }
        if let Some(raw) = lookup(ENV_BACKEND) {
            match raw.parse::<Backend>() {
                Ok(b) => config.backend = Some(b),
                Err(e) => warn!("ignoring {ENV_BACKEND}: {e}"),
            }
        }
        if let Some(raw) = lookup(ENV_BLOCK_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(bs) if bs > 0 && bs % 8 == 0 => config.block_size = Some(bs),
                _ => warn!("ignoring {ENV_BLOCK_SIZE}={raw:?}: expected a positive multiple of 8"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_is_default() {
        assert_eq!(PipelineConfig::from_lookup(lookup(&[])), PipelineConfig::default());
    }

    #[test]
    fn reads_all_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_THREADS, "4"),
            (ENV_BACKEND, "wide8"),
            (ENV_BLOCK_SIZE, "256"),
        ]));
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.backend, Some(Backend::Wide8));
        assert_eq!(config.block_size, Some(256));
    }

    #[test]
    fn bad_values_are_ignored() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_THREADS, "0"),
            (ENV_BACKEND, "mmx"),
            (ENV_BLOCK_SIZE, "100"),
        ]));
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn json_roundtrip_with_missing_fields() {
        let config: PipelineConfig = serde_json::from_str(r#"{"backend":"wide16"}"#).unwrap();
        assert_eq!(config, PipelineConfig::default().with_backend(Backend::Wide16));
        let json = serde_json::to_string(&config.clone().with_threads(2)).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.threads, Some(2));
    }
}
