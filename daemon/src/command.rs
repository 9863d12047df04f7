/// External commands the daemon runs, and a helper for bounded one-shot calls.
use std::fmt;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::ExternalCallError;

pub const PLAYERCTL: &str = "playerctl";
/// Output format requested from the metadata source; must match [`crate::line`].
pub const METADATA_FORMAT: &str = "{{status}}||{{playerName}}||{{artist}}||{{title}}";

/// A program plus its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `playerctl -a metadata --format ... --follow`: streams one line per
    /// state change of any player until killed.
    pub fn metadata_follow() -> Self {
        Self::new(PLAYERCTL, ["-a", "metadata", "--format", METADATA_FORMAT, "--follow"])
    }

    /// `playerctl volume`: prints the active player's volume as a float in [0, 1].
    pub fn volume_query() -> Self {
        Self::new(PLAYERCTL, ["volume"])
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Runs the command to completion, killing it if it outlives `limit`.
    /// Only a zero exit status counts as success.
    pub async fn run_bounded(&self, limit: Duration) -> Result<Output, ExternalCallError> {
        let mut cmd = self.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ExternalCallError::Io {
                    command: self.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ExternalCallError::Timeout {
                    command: self.to_string(),
                    timeout: limit,
                })
            }
        };

        if output.status.success() {
            Ok(output)
        } else {
            Err(ExternalCallError::Status {
                command: self.to_string(),
                status: output.status,
            })
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_command_requests_delimited_format() {
        let cmd = ExternalCommand::metadata_follow();
        assert_eq!(cmd.program, PLAYERCTL);
        assert!(cmd.args.iter().any(|a| a == "--follow"));
        assert!(cmd.args.iter().any(|a| a == "-a"));
        assert!(cmd.args.contains(&METADATA_FORMAT.to_string()));
    }

    #[test]
    fn display_joins_program_and_args() {
        assert_eq!(ExternalCommand::volume_query().to_string(), "playerctl volume");
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let cmd = ExternalCommand::new("mediaplayer-test-no-such-binary", Vec::<String>::new());
        let err = cmd.run_bounded(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ExternalCallError::Io { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_status_error() {
        let cmd = ExternalCommand::new("sh", ["-c", "exit 3"]);
        let err = cmd.run_bounded(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ExternalCallError::Status { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let cmd = ExternalCommand::new("sleep", ["5"]);
        let err = cmd.run_bounded(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ExternalCallError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let cmd = ExternalCommand::new("sh", ["-c", "echo 0.5"]);
        let output = cmd.run_bounded(Duration::from_secs(2)).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0.5");
    }
}
