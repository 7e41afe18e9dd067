//! Nginx config generation.
//!
//! Watchers are split by mode: http services land in one `http {}` block,
//! tcp services in one `stream {}` block. Each contributes a `server`
//! stanza (only with a port) and an `upstream` stanza (only with backends).

use chrono::{DateTime, Utc};
use tracing::debug;

use super::command::{CommandRunner, ShellRunner};
use super::options::{GeneratorOptions, NginxConfig, ProxyMode, missing_options};
use super::reconcile::Reconciler;
use super::restart::{RestartCommands, RestartScheduler};
use super::writer::ConfigWriter;
use super::{ConfigGenerator, with_provenance};
use crate::error::{GeneratorError, Result};
use crate::models::{Watcher, arrange_backends};

pub const NAME: &str = "nginx";

/// Contexts that are never rendered as their own top-level block
const SPECIAL_CONTEXTS: [&str; 3] = ["main", "http", "stream"];

pub struct Nginx {
    config: NginxConfig,
    reconciler: Reconciler,
}

impl Nginx {
    pub fn new(config: NginxConfig) -> Result<Self> {
        Self::with_runner(config, Box::new(ShellRunner))
    }

    pub fn with_runner(config: NginxConfig, runner: Box<dyn CommandRunner>) -> Result<Self> {
        for (context, section) in [("main", "contexts.main"), ("events", "contexts.events")] {
            if !config.contexts.contains_key(context) {
                return Err(GeneratorError::MissingSection {
                    proxy: NAME,
                    section,
                });
            }
        }

        if config.do_writes {
            let missing = missing_options(&[
                ("config_file_path", config.config_file_path.is_some()),
                ("check_command", config.check_command.is_some()),
            ]);
            if !missing.is_empty() {
                return Err(GeneratorError::MissingOptions {
                    condition: "do_writes",
                    missing,
                });
            }
        }

        if config.do_reloads {
            let missing = missing_options(&[
                ("reload_command", config.reload_command.is_some()),
                ("start_command", config.start_command.is_some()),
            ]);
            if !missing.is_empty() {
                return Err(GeneratorError::MissingOptions {
                    condition: "do_reloads",
                    missing,
                });
            }
        }

        if !config.restart_jitter.is_finite() || config.restart_jitter < 0.0 {
            return Err(GeneratorError::InvalidOption {
                option: "restart_jitter",
                message: format!("{} is not a non-negative fraction", config.restart_jitter),
            });
        }

        let writer = match (&config.config_file_path, config.do_writes) {
            (Some(path), true) => Some(ConfigWriter::new(path, config.check_command.clone())),
            _ => None,
        };
        let commands = match (&config.reload_command, config.do_reloads) {
            (Some(reload), true) => Some(RestartCommands {
                start: config.start_command.clone(),
                reload: reload.clone(),
            }),
            _ => None,
        };
        let scheduler = RestartScheduler::new(NAME, config.restart_interval, config.restart_jitter);

        Ok(Self {
            reconciler: Reconciler::new(writer, commands, scheduler, runner),
            config,
        })
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Renders the full config with a fixed provenance timestamp
    pub fn render_at(&self, watchers: &[Watcher], generated_at: DateTime<Utc>) -> Result<String> {
        let mut lines = self.base_config();
        let mut http = Vec::new();
        let mut stream = Vec::new();
        let defaults = GeneratorOptions::default();

        for watcher in watchers {
            let opts = watcher.options(NAME).unwrap_or(&defaults);
            if opts.disabled {
                debug!(service = %watcher.name, "Skipping disabled watcher");
                continue;
            }

            let mode = opts.mode(&watcher.name)?;
            let section = match mode {
                ProxyMode::Http => &mut http,
                ProxyMode::Tcp => &mut stream,
            };
            section.extend(self.server_stanza(watcher, opts, mode));
            section.extend(upstream_stanza(watcher, opts));
        }

        self.push_protocol_block(&mut lines, "http", http);
        self.push_protocol_block(&mut lines, "stream", stream);

        let body = lines.join("\n");
        debug!(generator = NAME, "New config: {}", body);
        Ok(with_provenance(body, generated_at))
    }

    /// `main` directives at top level, then every other declared context
    fn base_config(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(main) = self.config.contexts.get("main") {
            lines.extend(main.iter().map(|option| format!("{};", option)));
        }
        lines.push(String::new());

        for (context, options) in &self.config.contexts {
            if SPECIAL_CONTEXTS.contains(&context.as_str()) {
                continue;
            }
            lines.push(format!("{} {{", context));
            lines.extend(options.iter().map(|option| format!("\t{};", option)));
            lines.push("}".to_string());
            lines.push(String::new());
        }

        lines
    }

    /// Wraps stanzas in `http {}` / `stream {}`, leading with the context's own directives
    fn push_protocol_block(&self, lines: &mut Vec<String>, context: &str, stanzas: Vec<String>) {
        let directives = self
            .config
            .contexts
            .get(context)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if stanzas.is_empty() && directives.is_empty() {
            return;
        }

        lines.push(format!("{} {{", context));
        lines.extend(directives.iter().map(|option| format!("\t{};", option)));
        lines.extend(stanzas);
        lines.push("}".to_string());
        lines.push(String::new());
    }

    fn server_stanza(&self, watcher: &Watcher, opts: &GeneratorOptions, mode: ProxyMode) -> Vec<String> {
        let Some(port) = opts.port else {
            debug!(service = %watcher.name, "Not generating server stanza; no port defined");
            return Vec::new();
        };

        let listen_address = opts.listen_address(self.config.listen_address.as_deref());
        let upstream_name = opts.upstream_name(&watcher.name);

        let mut stanza = vec![
            "\tserver {".to_string(),
            format!("\t\tlisten {}:{};", listen_address, port),
        ];
        stanza.extend(opts.server.iter().map(|directive| format!("\t\t{};", directive)));
        stanza.extend(proxy_stanza(mode, upstream_name));
        stanza.push("\t}".to_string());
        stanza
    }
}

/// http and stream modules address upstreams differently
fn proxy_stanza(mode: ProxyMode, upstream_name: &str) -> Vec<String> {
    match mode {
        ProxyMode::Http => vec![
            "\t\tlocation / {".to_string(),
            format!("\t\t\tproxy_pass http://{};", upstream_name),
            "\t\t}".to_string(),
        ],
        ProxyMode::Tcp => vec![format!("\t\tproxy_pass {};", upstream_name)],
    }
}

/// Empty upstream groups are invalid nginx syntax, so none is emitted
fn upstream_stanza(watcher: &Watcher, opts: &GeneratorOptions) -> Vec<String> {
    let backends = arrange_backends(&watcher.backends, opts.upstream_order());
    if backends.is_empty() {
        debug!(service = %watcher.name, "Not generating upstream stanza; no backends");
        return Vec::new();
    }

    let mut stanza = vec![format!("\tupstream {} {{", opts.upstream_name(&watcher.name))];
    stanza.extend(opts.upstream.iter().map(|directive| format!("\t\t{};", directive)));
    stanza.extend(backends.iter().map(|backend| match &opts.server_options {
        Some(server_options) => format!("\t\tserver {} {};", backend.address(), server_options),
        None => format!("\t\tserver {};", backend.address()),
    }));
    stanza.push("\t}".to_string());
    stanza
}

impl ConfigGenerator for Nginx {
    fn name(&self) -> &'static str {
        NAME
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
