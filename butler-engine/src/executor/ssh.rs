//! SSH channel
//!
//! Shells out to the system `ssh` client. Authentication is key based only:
//! either the configured identity file or whatever the ssh agent offers.
//! `BatchMode` keeps ssh from ever prompting.

use std::process::Command;

use tracing::debug;

use super::{ExecutionOutput, RemoteChannel, TransportError, exit_code_of};
use crate::config::SshConfig;

/// Exit status ssh itself uses for connection and authentication errors
const SSH_ERROR_STATUS: i32 = 255;

pub struct SshChannel {
    config: SshConfig,
    program: String,
}

impl SshChannel {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            program: "ssh".to_string(),
        }
    }

    /// Uses another ssh-compatible client binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];

        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        args.push(format!("{}@{}", self.config.username, self.config.host));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

impl RemoteChannel for SshChannel {
    fn execute(&self, command: &str) -> Result<ExecutionOutput, TransportError> {
        debug!("ssh {}@{}: {}", self.config.username, self.config.host, command);

        let output = Command::new(&self.program)
            .args(self.args(command))
            .output()
            .map_err(|source| TransportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let exit_code = exit_code_of(output.status);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code == SSH_ERROR_STATUS {
            return Err(TransportError::Connect {
                host: self.config.host.clone(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(ExecutionOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}
