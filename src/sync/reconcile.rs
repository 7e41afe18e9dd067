use tracing::debug;

use super::command::CommandRunner;
use super::restart::{RestartCommands, RestartScheduler};
use super::writer::{ConfigWriter, WriteOutcome};
use crate::error::Result;

/// Writer, restart scheduler and command runner shared by every generator.
///
/// `writer` is `None` when writes are disabled, `commands` when reloads are.
pub struct Reconciler {
    writer: Option<ConfigWriter>,
    commands: Option<RestartCommands>,
    scheduler: RestartScheduler,
    runner: Box<dyn CommandRunner>,
}

impl Reconciler {
    pub fn new(
        writer: Option<ConfigWriter>,
        commands: Option<RestartCommands>,
        scheduler: RestartScheduler,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            writer,
            commands,
            scheduler,
            runner,
        }
    }

    pub fn scheduler(&self) -> &RestartScheduler {
        &self.scheduler
    }

    pub fn apply(&mut self, new_config: &str) -> Result<Option<WriteOutcome>> {
        let Some(writer) = &self.writer else {
            debug!("Writes disabled; not touching config file");
            return Ok(None);
        };

        let outcome = writer.write(new_config, self.runner.as_mut())?;
        if outcome.changed() {
            self.scheduler.request();
        }
        self.restart_if_required();

        Ok(Some(outcome))
    }

    pub fn tick(&mut self) {
        self.scheduler.advance();
        self.restart_if_required();
    }

    fn restart_if_required(&mut self) {
        if let Some(commands) = &self.commands {
            if self.scheduler.restart_required() {
                self.scheduler.restart(commands, self.runner.as_mut());
            }
        }
    }
}
