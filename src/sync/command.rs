use std::io;
use std::process::Command;

/// Exit status and captured output of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// Runs the check, start and reload commands.
///
/// Commands run synchronously to completion with no timeout.
pub trait CommandRunner: Send {
    fn run(&mut self, command: &str) -> io::Result<CommandOutput>;
}

/// Runs commands through `sh -c`
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> io::Result<CommandOutput> {
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn shell_runner_reports_exit_status() {
        let mut runner = ShellRunner;
        let ok = runner.run("echo hello").unwrap();
        assert!(ok.success);
        assert_eq!(ok.stdout, "hello");

        let failed = runner.run("echo oops >&2; exit 3").unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(3));
        assert_eq!(failed.stderr, "oops");
    }
}
