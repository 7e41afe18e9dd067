use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::sync::options::GeneratorOptions;

// ============================================================================
// Domain Models
// ============================================================================

/// One discovered endpoint of a watched service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Backend {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub name: Option<String>,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            name: None,
        }
    }

    pub fn named(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(host, port)
        }
    }

    /// Stable label used to order and deduplicate backends
    pub fn identity(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => format!("{}_{}:{}", name, self.host, self.port),
            _ => self.address(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A named service and its current backend pool, as handed over by discovery
#[derive(Debug, Clone, Default)]
pub struct Watcher {
    pub name: String,
    pub backends: Vec<Backend>,
    /// Per-generator options, keyed by generator name ("nginx", "haproxy")
    pub generator_config: BTreeMap<String, GeneratorOptions>,
}

impl Watcher {
    pub fn new(name: impl Into<String>, backends: Vec<Backend>) -> Self {
        Self {
            name: name.into(),
            backends,
            generator_config: BTreeMap::new(),
        }
    }

    pub fn with_options(mut self, generator: &str, options: GeneratorOptions) -> Self {
        self.generator_config.insert(generator.to_string(), options);
        self
    }

    pub fn options(&self, generator: &str) -> Option<&GeneratorOptions> {
        self.generator_config.get(generator)
    }
}

/// How backends are ordered inside an upstream group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamOrder {
    Asc,
    Desc,
    /// Discovery order
    #[default]
    NoShuffle,
    /// Uniformly random on every render; defeats diff-gated writes
    Shuffle,
}

/// Deduplicates backends by identity and orders them.
///
/// A repeated identity keeps the position of its first occurrence and the
/// value of its last one.
pub fn arrange_backends(backends: &[Backend], order: UpstreamOrder) -> Vec<&Backend> {
    let mut by_identity: IndexMap<String, &Backend> = IndexMap::with_capacity(backends.len());
    for backend in backends {
        by_identity.insert(backend.identity(), backend);
    }

    match order {
        UpstreamOrder::Asc => by_identity.sort_keys(),
        UpstreamOrder::Desc => by_identity.sort_by(|a, _, b, _| b.cmp(a)),
        UpstreamOrder::NoShuffle => {}
        UpstreamOrder::Shuffle => {
            let mut shuffled: Vec<&Backend> = by_identity.into_values().collect();
            shuffled.shuffle(&mut rand::thread_rng());
            return shuffled;
        }
    }

    by_identity.into_values().collect()
}
