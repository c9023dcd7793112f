//! Local shell channel, for single-host deployments

use std::process::Command;

use tracing::debug;

use super::{ExecutionOutput, RemoteChannel, TransportError, exit_code_of};

#[derive(Debug, Clone)]
pub struct LocalShell {
    shell: String,
}

impl LocalShell {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteChannel for LocalShell {
    fn execute(&self, command: &str) -> Result<ExecutionOutput, TransportError> {
        debug!("{} -c {}", self.shell, command);

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|source| TransportError::Spawn {
                program: self.shell.clone(),
                source,
            })?;

        Ok(ExecutionOutput {
            exit_code: exit_code_of(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_exit_code() {
        let output = LocalShell::new()
            .execute("echo hello; echo oops >&2; exit 2")
            .unwrap();
        assert_eq!(output.exit_code, 2);
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[test]
    fn test_runs_in_requested_folder() {
        let dir = tempfile::tempdir().unwrap();
        let command = format!("cd {}; pwd", dir.path().display());
        let output = LocalShell::new().execute(&command).unwrap();
        assert!(output.success());
        assert!(output.stdout.trim().ends_with(
            dir.path().file_name().unwrap().to_str().unwrap()
        ));
    }
}
