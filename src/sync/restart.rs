//! Virtual-clock rate limiter for proxy restarts.
//!
//! The clock only moves when the owner calls [`RestartScheduler::advance`],
//! once per tick. Renders can happen far more often than restarts; every
//! change between two allowed restarts collapses into a single reload.

use rand::Rng;
use tracing::{debug, error, info};

use super::command::CommandRunner;

/// Commands used to bring the proxy up and make it pick up a new config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartCommands {
    /// Best-effort; run once per process lifetime before the first reload
    pub start: Option<String>,
    pub reload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Deferred { until: u64 },
    Reloaded,
    Failed,
}

#[derive(Debug)]
pub struct RestartScheduler {
    proxy: &'static str,
    interval: u64,
    jitter: f64,
    clock: u64,
    next_restart: u64,
    restart_required: bool,
    has_started: bool,
}

impl RestartScheduler {
    /// A fresh scheduler wants one restart so the proxy gets started on boot.
    pub fn new(proxy: &'static str, interval: u64, jitter: f64) -> Self {
        Self {
            proxy,
            interval,
            jitter,
            clock: 0,
            next_restart: 0,
            restart_required: true,
            has_started: false,
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn next_restart(&self) -> u64 {
        self.next_restart
    }

    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn advance(&mut self) {
        self.clock += 1;
    }

    /// Marks the running proxy as stale. Only a successful reload clears it.
    pub fn request(&mut self) {
        self.restart_required = true;
    }

    pub fn restart(
        &mut self,
        commands: &RestartCommands,
        runner: &mut dyn CommandRunner,
    ) -> RestartOutcome {
        if self.clock < self.next_restart {
            info!(
                proxy = self.proxy,
                time = self.clock,
                next_restart = self.next_restart,
                "Waiting to restart"
            );
            return RestartOutcome::Deferred {
                until: self.next_restart,
            };
        }

        self.next_restart = self
            .clock
            .saturating_add(self.interval)
            .saturating_add(self.jitter_delay());

        if !self.has_started {
            if let Some(start) = &commands.start {
                info!(proxy = self.proxy, command = %start, "Attempting to start proxy; this can fail if it is already running");
                match runner.run(start) {
                    Ok(output) if !output.success => {
                        debug!(proxy = self.proxy, code = ?output.code, "Start command failed")
                    }
                    Err(e) => debug!(proxy = self.proxy, "Start command failed: {}", e),
                    Ok(_) => {}
                }
            }
            self.has_started = true;
        }

        match runner.run(&commands.reload) {
            Ok(output) if output.success => {
                info!(proxy = self.proxy, time = self.clock, "Restarted proxy");
                self.restart_required = false;
                RestartOutcome::Reloaded
            }
            Ok(output) => {
                error!(
                    proxy = self.proxy,
                    command = %commands.reload,
                    code = ?output.code,
                    "Failed to reload: {}",
                    output.stderr
                );
                RestartOutcome::Failed
            }
            Err(e) => {
                error!(proxy = self.proxy, command = %commands.reload, "Failed to reload: {}", e);
                RestartOutcome::Failed
            }
        }
    }

    /// Uniform whole number of ticks in `0..=floor(jitter * interval)`
    fn jitter_delay(&self) -> u64 {
        let max = (self.jitter * self.interval as f64).floor() as u64;
        if max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max)
        }
    }
}
