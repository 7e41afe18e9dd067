pub mod command;
pub mod haproxy;
pub mod manifest;
pub mod nginx;
pub mod options;
pub mod reconcile;
pub mod restart;
pub mod service;
pub mod writer;

pub use haproxy::Haproxy;
pub use nginx::Nginx;
pub use service::SyncService;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Result;
use crate::models::Watcher;
use options::GeneratorOptions;

pub const PROVENANCE_PREFIX: &str = "# auto-generated by proxysync at";

/// What every proxy backend exposes to the reconciliation loop.
///
/// Callers serialize calls to one generator; `update_config` runs whenever
/// discovery state may have changed, `tick` on a fixed cadence.
pub trait ConfigGenerator: Send {
    fn name(&self) -> &'static str;

    /// Fills in per-watcher defaults before the watcher is first rendered
    fn normalize_options(&self, watcher_name: &str, options: &mut GeneratorOptions) {
        if options.mode.is_none() {
            options.mode = Some("http".to_string());
        }
        warn_if_portless(self.name(), watcher_name, options);
    }

    fn generate_config(&self, watchers: &[Watcher]) -> Result<String>;

    /// Render, write when changed, restart when allowed
    fn update_config(&mut self, watchers: &[Watcher]) -> Result<()>;

    /// Advances the restart clock and retries a deferred restart
    fn tick(&mut self, watchers: &[Watcher]);
}

pub(crate) fn warn_if_portless(generator: &str, watcher_name: &str, options: &GeneratorOptions) {
    if options.port.is_none() {
        warn!(
            generator,
            service = watcher_name,
            "Config does not include a port; only upstream sections for the service will be created; you must move traffic there manually"
        );
    }
}

/// Short hex fingerprint of rendered content
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();

    hash[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Prepends the provenance line to a rendered body
pub(crate) fn with_provenance(body: String, generated_at: DateTime<Utc>) -> String {
    format!(
        "{} {} (sha256 {})\n{}",
        PROVENANCE_PREFIX,
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        content_digest(&body),
        body
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn digest_is_stable_and_short() {
        let a = content_digest("upstream svc {}");
        assert_eq!(a.len(), 16);
        assert_eq!(a, content_digest("upstream svc {}"));
        assert_ne!(a, content_digest("upstream other {}"));
    }

    #[test]
    fn provenance_line_carries_time_and_digest() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let config = with_provenance("events {\n}\n".to_string(), at);
        let (header, body) = config.split_once('\n').unwrap();
        assert!(header.starts_with(PROVENANCE_PREFIX));
        assert!(header.contains("2026-10-16T12:00:00Z"));
        assert!(header.contains(&content_digest(body)));
    }
}
