//! HAProxy config generation.
//!
//! HAProxy has no separate upstream blocks: each watcher becomes one
//! `listen` section holding both the bind address and the server lines.
//! A `mode` line is only written for watchers that set one; everything
//! else inherits the mode from `defaults`.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::command::{CommandRunner, ShellRunner};
use super::options::{GeneratorOptions, HaproxyConfig};
use super::reconcile::Reconciler;
use super::restart::{RestartCommands, RestartScheduler};
use super::writer::ConfigWriter;
use super::{ConfigGenerator, warn_if_portless, with_provenance};
use crate::error::{GeneratorError, Result};
use crate::models::{Watcher, arrange_backends};

pub const NAME: &str = "haproxy";

pub struct Haproxy {
    config: HaproxyConfig,
    reconciler: Reconciler,
}

impl Haproxy {
    pub fn new(config: HaproxyConfig) -> Result<Self> {
        Self::with_runner(config, Box::new(ShellRunner))
    }

    pub fn with_runner(config: HaproxyConfig, runner: Box<dyn CommandRunner>) -> Result<Self> {
        if config.global.is_none() {
            return Err(GeneratorError::MissingSection {
                proxy: NAME,
                section: "global",
            });
        }
        if config.defaults.is_none() {
            return Err(GeneratorError::MissingSection {
                proxy: NAME,
                section: "defaults",
            });
        }

        let requirements = [
            ("do_writes", config.do_writes, "config_file_path", config.config_file_path.is_some()),
            ("do_reloads", config.do_reloads, "reload_command", config.reload_command.is_some()),
        ];
        for (condition, enabled, option, present) in requirements {
            if enabled && !present {
                return Err(GeneratorError::MissingOptions {
                    condition,
                    missing: vec![option],
                });
            }
        }

        let writer = match (&config.config_file_path, config.do_writes) {
            (Some(path), true) => Some(ConfigWriter::new(path, None)),
            _ => None,
        };
        let commands = match (&config.reload_command, config.do_reloads) {
            (Some(reload), true) => Some(RestartCommands {
                start: config.start_command.clone(),
                reload: reload.clone(),
            }),
            _ => None,
        };
        let scheduler = RestartScheduler::new(NAME, config.restart_interval, 0.0);

        Ok(Self {
            reconciler: Reconciler::new(writer, commands, scheduler, runner),
            config,
        })
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn render_at(&self, watchers: &[Watcher], generated_at: DateTime<Utc>) -> Result<String> {
        let mut body = self.base_config();
        let defaults = GeneratorOptions::default();

        for watcher in watchers {
            let opts = watcher.options(NAME).unwrap_or(&defaults);
            if opts.disabled {
                debug!(service = %watcher.name, "Skipping disabled watcher");
                continue;
            }
            body.push_str(&self.listen_stanza(watcher, opts)?);
        }

        debug!(generator = NAME, "New config: {}", body);
        Ok(with_provenance(body, generated_at))
    }

    /// The `global` and `defaults` sections
    fn base_config(&self) -> String {
        let mut base = String::new();
        for (section, options) in [("global", &self.config.global), ("defaults", &self.config.defaults)] {
            base.push_str(section);
            base.push('\n');
            for option in options.iter().flatten() {
                base.push_str(&format!("\t{}\n", option));
            }
            base.push('\n');
        }
        base
    }

    /// One `listen` section, or `backend` when the watcher has no port
    fn listen_stanza(&self, watcher: &Watcher, opts: &GeneratorOptions) -> Result<String> {
        let mode = opts.mode.as_ref().map(|_| opts.mode(&watcher.name)).transpose()?;
        let backends = arrange_backends(&watcher.backends, opts.upstream_order());
        if backends.is_empty() {
            info!(service = %watcher.name, "No backends found for watcher");
            return Ok(String::new());
        }

        let name = opts.upstream_name(&watcher.name);
        let mut stanza = match opts.port {
            Some(port) => {
                let address = opts.listen_address(self.config.listen_address.as_deref());
                format!("listen {} {}:{}\n", name, address, port)
            }
            None => format!("backend {}\n", name),
        };
        if let Some(mode) = mode {
            stanza.push_str(&format!("\tmode {}\n", mode));
        }

        for directive in &opts.server {
            stanza.push_str(&format!("\t{}\n", directive));
        }

        for backend in backends {
            let line = match &opts.server_options {
                Some(server_options) => format!(
                    "\tserver {} {} {}\n",
                    backend.identity(),
                    backend.address(),
                    server_options
                ),
                None => format!("\tserver {} {}\n", backend.identity(), backend.address()),
            };
            stanza.push_str(&line);
        }
        stanza.push('\n');

        Ok(stanza)
    }
}

impl ConfigGenerator for Haproxy {
    fn name(&self) -> &'static str {
        NAME
    }

    /// Leaves `mode` unset; an unset mode inherits from `defaults`
    fn normalize_options(&self, watcher_name: &str, options: &mut GeneratorOptions) {
        warn_if_portless(NAME, watcher_name, options);
    }

    fn generate_config(&self, watchers: &[Watcher]) -> Result<String> {
        self.render_at(watchers, Utc::now())
    }

    fn update_config(&mut self, watchers: &[Watcher]) -> Result<()> {
        let new_config = self.generate_config(watchers)?;
        self.reconciler.apply(&new_config)?;
        Ok(())
    }

    fn tick(&mut self, _watchers: &[Watcher]) {
        self.reconciler.tick();
    }
}
