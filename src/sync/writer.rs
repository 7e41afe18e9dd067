//! Diff-gated config writes.
//!
//! New content is staged in a temp file next to the target and renamed into
//! place, so the live file only ever holds a complete config. A config the
//! check command rejects never stays on disk: either it was validated while
//! staged, or the previous content is put back after the check fails. The
//! next render therefore sees the same diff and tries again.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{error, info};

use super::command::CommandRunner;
use super::{PROVENANCE_PREFIX, content_digest};
use crate::error::{GeneratorError, Result};

/// Replaced by the staged file path when present in the check command
pub const CONFIG_PLACEHOLDER: &str = "{config}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Unchanged,
    Written,
    /// The check command refused the new content; the live file is untouched
    Rejected,
}

impl WriteOutcome {
    pub fn changed(self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigWriter {
    path: PathBuf,
    check_command: Option<String>,
}

impl ConfigWriter {
    pub fn new(path: impl Into<PathBuf>, check_command: Option<String>) -> Self {
        Self {
            path: path.into(),
            check_command,
        }
    }

    pub fn write(&self, new_config: &str, runner: &mut dyn CommandRunner) -> Result<WriteOutcome> {
        let old_config = self.read_existing()?;

        if config_body(old_config.as_deref().unwrap_or("")) == config_body(new_config) {
            return Ok(WriteOutcome::Unchanged);
        }

        let digest = content_digest(config_body(new_config));
        let accepted = match self.check_command.as_deref() {
            None => {
                self.commit(new_config)?;
                true
            }
            Some(check) if check.contains(CONFIG_PLACEHOLDER) => {
                let staged = self.stage(new_config)?;
                let command = check.replace(CONFIG_PLACEHOLDER, &staged.path().display().to_string());
                if self.check(&command, runner) {
                    staged
                        .persist(&self.path)
                        .map_err(|e| GeneratorError::io(&self.path, e.error))?;
                    true
                } else {
                    false
                }
            }
            Some(check) => {
                self.commit(new_config)?;
                let accepted = self.check(check, runner);
                if !accepted {
                    self.rollback(old_config.as_deref())?;
                }
                accepted
            }
        };

        if accepted {
            info!(path = %self.path.display(), digest = %digest, "Wrote new config");
            Ok(WriteOutcome::Written)
        } else {
            error!(path = %self.path.display(), digest = %digest, "Not restarting proxy as a result");
            Ok(WriteOutcome::Rejected)
        }
    }

    /// A missing file reads as `None`
    fn read_existing(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Could not open config file");
                Ok(None)
            }
            Err(e) => Err(GeneratorError::io(&self.path, e)),
        }
    }

    fn check(&self, command: &str, runner: &mut dyn CommandRunner) -> bool {
        match runner.run(command) {
            Ok(output) if output.success => true,
            Ok(output) => {
                error!(
                    command = %command,
                    code = ?output.code,
                    "Configuration is invalid: {}",
                    output.stderr
                );
                false
            }
            Err(e) => {
                error!(command = %command, "Could not run check command: {}", e);
                false
            }
        }
    }

    fn stage(&self, content: &str) -> Result<NamedTempFile> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |e: std::io::Error| GeneratorError::io(dir, e);

        let mut staged = NamedTempFile::new_in(dir).map_err(io_err)?;
        staged.write_all(content.as_bytes()).map_err(io_err)?;
        staged.as_file().sync_all().map_err(io_err)?;

        // Temp files are created owner-only; keep whatever the live file had
        let permissions = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.permissions()),
            Err(_) => default_permissions(),
        };
        if let Some(permissions) = permissions {
            fs::set_permissions(staged.path(), permissions).map_err(io_err)?;
        }

        Ok(staged)
    }

    fn commit(&self, content: &str) -> Result<()> {
        self.stage(content)?
            .persist(&self.path)
            .map_err(|e| GeneratorError::io(&self.path, e.error))?;
        Ok(())
    }

    fn rollback(&self, previous: Option<&str>) -> Result<()> {
        match previous {
            Some(content) => self.commit(content),
            None => fs::remove_file(&self.path).map_err(|e| GeneratorError::io(&self.path, e)),
        }
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

/// Everything after the provenance line, which changes on every render
pub fn config_body(config: &str) -> &str {
    if config.starts_with(PROVENANCE_PREFIX) {
        config.split_once('\n').map_or("", |(_, body)| body)
    } else {
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::RecordingRunner;
    use tempfile::TempDir;

    const OLD: &str = "# auto-generated by proxysync at 2026-01-01T00:00:00Z\nworker_processes 1;\n";
    const NEW: &str = "# auto-generated by proxysync at 2026-01-02T00:00:00Z\nworker_processes 2;\n";

    #[test]
    fn missing_file_counts_as_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        let writer = ConfigWriter::new(&path, None);
        let mut runner = RecordingRunner::default();

        assert_eq!(writer.write(NEW, &mut runner).unwrap(), WriteOutcome::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), NEW);
    }

    #[test]
    fn identical_content_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        fs::write(&path, OLD).unwrap();
        let writer = ConfigWriter::new(&path, Some("check".into()));
        let mut runner = RecordingRunner::default();

        assert_eq!(writer.write(OLD, &mut runner).unwrap(), WriteOutcome::Unchanged);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn new_timestamp_alone_is_not_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        fs::write(&path, OLD).unwrap();
        let writer = ConfigWriter::new(&path, None);
        let restamped = OLD.replace("2026-01-01", "2026-03-03");

        let outcome = writer.write(&restamped, &mut RecordingRunner::default()).unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);
    }

    #[test]
    fn rejected_config_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        fs::write(&path, OLD).unwrap();
        let writer = ConfigWriter::new(&path, Some("nginx -t".into()));
        let mut runner = RecordingRunner::default();
        runner.fail("nginx -t");

        assert_eq!(writer.write(NEW, &mut runner).unwrap(), WriteOutcome::Rejected);
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);

        // Still a diff, so the next attempt checks again
        assert_eq!(writer.write(NEW, &mut runner).unwrap(), WriteOutcome::Rejected);
        assert_eq!(runner.count("nginx -t"), 2);
    }

    #[test]
    fn rejected_first_config_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        let writer = ConfigWriter::new(&path, Some("nginx -t".into()));
        let mut runner = RecordingRunner::default();
        runner.fail("nginx -t");

        assert_eq!(writer.write(NEW, &mut runner).unwrap(), WriteOutcome::Rejected);
        assert!(!path.exists());
    }

    #[test]
    fn placeholder_validates_the_staged_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        fs::write(&path, OLD).unwrap();
        let writer = ConfigWriter::new(&path, Some("nginx -t -c {config}".into()));
        let mut runner = RecordingRunner::default();

        assert_eq!(writer.write(NEW, &mut runner).unwrap(), WriteOutcome::Written);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("nginx -t -c "));
        assert!(!calls[0].contains(CONFIG_PLACEHOLDER));
        assert!(!calls[0].ends_with("nginx.conf"));
        assert_eq!(fs::read_to_string(&path).unwrap(), NEW);
    }

    #[test]
    fn placeholder_rejection_never_touches_live_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        fs::write(&path, OLD).unwrap();
        let writer = ConfigWriter::new(&path, Some("nginx -t -c {config}".into()));
        let mut runner = RecordingRunner::default();
        runner.fail("nginx -t -c");

        assert_eq!(writer.write(NEW, &mut runner).unwrap(), WriteOutcome::Rejected);
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn config_body_skips_only_provenance() {
        assert_eq!(config_body(OLD), "worker_processes 1;\n");
        assert_eq!(config_body("worker_processes 1;\n"), "worker_processes 1;\n");
    }
}
