//! Static service manifest.
//!
//! A JSON document listing services with their `default_servers` and
//! per-generator options, plus the generator sections themselves:
//!
//! ```json
//! {
//!   "services": {
//!     "svc": {
//!       "default_servers": [{"host": "10.0.0.1", "port": 80}],
//!       "nginx": {"port": 8080, "upstream_order": "asc"}
//!     }
//!   },
//!   "nginx": {"contexts": {"main": [], "events": []}}
//! }
//! ```

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

use super::options::{GeneratorOptions, HaproxyConfig, NginxConfig};
use super::{ConfigGenerator, Haproxy, Nginx, content_digest, haproxy, nginx};
use crate::models::{Backend, Watcher};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceManifest {
    #[serde(default)]
    pub services: IndexMap<String, ServiceDefinition>,
    #[serde(default)]
    pub nginx: Option<NginxConfig>,
    #[serde(default)]
    pub haproxy: Option<HaproxyConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceDefinition {
    #[serde(default)]
    pub default_servers: Vec<Backend>,
    #[serde(default)]
    pub nginx: Option<GeneratorOptions>,
    #[serde(default)]
    pub haproxy: Option<GeneratorOptions>,
}

impl ServiceDefinition {
    fn options_for(&self, generator: &str) -> Option<&GeneratorOptions> {
        match generator {
            nginx::NAME => self.nginx.as_ref(),
            haproxy::NAME => self.haproxy.as_ref(),
            _ => None,
        }
    }
}

impl ServiceManifest {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid service manifest")
    }

    /// Loads the manifest and returns it with the digest of its content
    pub fn load(path: &Path) -> Result<(Self, String)> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = Self::parse(&content)?;
        Ok((manifest, content_digest(&content)))
    }

    /// Builds every configured generator, validating its options
    pub fn build_generators(&self) -> Result<Vec<Box<dyn ConfigGenerator>>> {
        let mut generators: Vec<Box<dyn ConfigGenerator>> = Vec::new();

        if let Some(config) = &self.nginx {
            generators.push(Box::new(Nginx::new(config.clone())?));
        }
        if let Some(config) = &self.haproxy {
            generators.push(Box::new(Haproxy::new(config.clone())?));
        }

        if generators.is_empty() {
            bail!("No config generators specified; add an nginx or haproxy section");
        }
        Ok(generators)
    }

    /// Watchers with options normalized by every generator
    pub fn watchers(&self, generators: &[Box<dyn ConfigGenerator>]) -> Vec<Watcher> {
        self.services
            .iter()
            .map(|(name, service)| {
                let mut watcher = Watcher::new(name.clone(), service.default_servers.clone());
                for generator in generators {
                    let mut options = service
                        .options_for(generator.name())
                        .cloned()
                        .unwrap_or_default();
                    generator.normalize_options(name, &mut options);
                    watcher
                        .generator_config
                        .insert(generator.name().to_string(), options);
                }
                watcher
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "services": {
            "web": {
                "default_servers": [
                    {"host": "10.0.0.1", "port": 80, "name": "a"},
                    {"host": "10.0.0.2", "port": 80}
                ],
                "nginx": {"port": 8080, "mode": "http"}
            },
            "db": {
                "default_servers": [{"host": "10.0.1.1", "port": 5432}],
                "nginx": {"port": 5432, "mode": "tcp"}
            }
        },
        "nginx": {
            "contexts": {"main": ["worker_processes 1"], "events": []},
            "do_writes": false,
            "do_reloads": false
        }
    }"#;

    #[test]
    fn builds_watchers_in_manifest_order() {
        let manifest = ServiceManifest::parse(MANIFEST).unwrap();
        let generators = manifest.build_generators().unwrap();
        let watchers = manifest.watchers(&generators);

        let names: Vec<&str> = watchers.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["web", "db"]);
        assert_eq!(watchers[0].backends[0], Backend::named("a", "10.0.0.1", 80));
        assert_eq!(watchers[1].options("nginx").unwrap().mode.as_deref(), Some("tcp"));
    }

    #[test]
    fn missing_generator_options_are_normalized_defaults() {
        let manifest = ServiceManifest::parse(
            r#"{
                "services": {"bare": {"default_servers": []}},
                "nginx": {"contexts": {"main": [], "events": []}, "do_writes": false, "do_reloads": false}
            }"#,
        )
        .unwrap();
        let generators = manifest.build_generators().unwrap();
        let watchers = manifest.watchers(&generators);

        let opts = watchers[0].options("nginx").unwrap();
        assert_eq!(opts.mode.as_deref(), Some("http"));
        assert_eq!(opts.port, None);
    }

    #[test]
    fn manifest_without_generators_is_rejected() {
        let manifest = ServiceManifest::parse(r#"{"services": {}}"#).unwrap();
        assert!(manifest.build_generators().is_err());
    }

    #[test]
    fn invalid_generator_section_fails_construction() {
        let manifest = ServiceManifest::parse(r#"{"nginx": {"contexts": {"main": []}}}"#).unwrap();
        let err = manifest.build_generators().err().unwrap();
        assert!(err.to_string().contains("contexts.events"));
    }
}
