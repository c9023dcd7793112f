//! Remote execution
//!
//! A [`RemoteChannel`] sends one shell command to the compute host and
//! captures what it printed. The channel only distinguishes "the command ran"
//! from "the command could not be sent": a non-zero exit status is a normal
//! [`ExecutionOutput`], never a [`TransportError`].
//!
//! Channels are blocking; async callers go through [`execute`], which moves
//! the call onto the blocking thread pool.

mod local;
mod ssh;

pub use local::LocalShell;
pub use ssh::SshChannel;

use std::sync::Arc;

use thiserror::Error;

use crate::config::ChannelConfig;

/// The command could not be delivered to the compute host
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local client program could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection or authentication with the host failed
    #[error("Connection to {host} failed: {message}")]
    Connect { host: String, message: String },

    /// The blocking execution task panicked or was cancelled
    #[error("Execution task aborted: {0}")]
    Aborted(String),
}

/// Captured result of a command that did run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of running a task's command, as consumed by completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { stdout: String },
    Failed(PipelineFailure),
}

/// A command that ran and exited with a non-zero status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl From<ExecutionOutput> for ExecutionOutcome {
    fn from(output: ExecutionOutput) -> Self {
        if output.success() {
            ExecutionOutcome::Succeeded {
                stdout: output.stdout,
            }
        } else {
            ExecutionOutcome::Failed(PipelineFailure {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}

/// Channel to the compute host
pub trait RemoteChannel: Send + Sync {
    /// Runs `command` through the host's shell and waits for it to exit
    fn execute(&self, command: &str) -> Result<ExecutionOutput, TransportError>;
}

/// Builds the channel described by the configuration
pub fn from_config(config: &ChannelConfig) -> Arc<dyn RemoteChannel> {
    match config {
        ChannelConfig::Ssh(ssh) => Arc::new(SshChannel::new(ssh.clone())),
        ChannelConfig::Local => Arc::new(LocalShell::new()),
    }
}

/// Runs `command` on the blocking pool and classifies the result
pub async fn execute(
    channel: Arc<dyn RemoteChannel>,
    command: String,
) -> Result<ExecutionOutcome, TransportError> {
    let output = tokio::task::spawn_blocking(move || channel.execute(&command))
        .await
        .map_err(|e| TransportError::Aborted(e.to_string()))??;

    Ok(output.into())
}

/// Exit code reported for a process killed by a signal
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl RemoteChannel for Echo {
        fn execute(&self, command: &str) -> Result<ExecutionOutput, TransportError> {
            Ok(ExecutionOutput {
                exit_code: if command.contains("fail") { 3 } else { 0 },
                stdout: command.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_output_classification() {
        let ok = ExecutionOutput {
            exit_code: 0,
            stdout: "done".to_string(),
            stderr: String::new(),
        };
        assert_eq!(
            ExecutionOutcome::from(ok),
            ExecutionOutcome::Succeeded {
                stdout: "done".to_string()
            }
        );

        let failed = ExecutionOutput {
            exit_code: 2,
            stdout: "partial".to_string(),
            stderr: "boom".to_string(),
        };
        match ExecutionOutcome::from(failed) {
            ExecutionOutcome::Failed(f) => {
                assert_eq!(f.exit_code, 2);
                assert_eq!(f.stderr, "boom");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_runs_on_blocking_pool() {
        let outcome = execute(Arc::new(Echo), "please fail".to_string())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed(PipelineFailure { exit_code: 3, .. })
        ));
    }
}
