//! Provider traits for external collaborators
//!
//! The reconciliation core never spawns processes or reads credential
//! stores itself; the binary supplies implementations of these traits.

use crate::error::ExecutionError;
use crate::types::CommandOutput;
use std::collections::BTreeMap;
use std::time::Duration;

/// Synchronous subprocess invocation with an explicit timeout
///
/// Every external call (package manager, service manager, hostname tool)
/// goes through this trait. A timeout is reported as
/// [`ExecutionError::Timeout`], a normal failure, never a panic.
pub trait CommandRunner: Send + Sync {
    /// Run a command, capturing output
    fn run(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError>;

    /// Run a command, mapping non-zero exit to an error
    fn run_ok(&self, cmd: &str, args: &[&str], timeout: Duration) -> Result<(), ExecutionError> {
        let output = self.run(cmd, args, timeout)?;
        if output.success {
            Ok(())
        } else {
            Err(ExecutionError::CommandFailed {
                command: format!("{} {}", cmd, args.join(" ")),
                stderr: output.stderr_str().trim().to_string(),
            })
        }
    }

    /// Run a command and capture trimmed stdout
    fn run_capture(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, ExecutionError> {
        let output = self.run(cmd, args, timeout)?;
        if output.success {
            Ok(output.stdout_str().trim().to_string())
        } else {
            Err(ExecutionError::CommandFailed {
                command: format!("{} {}", cmd, args.join(" ")),
                stderr: output.stderr_str().trim().to_string(),
            })
        }
    }

    /// Run a command, returning just success/failure
    fn probe(&self, cmd: &str, args: &[&str], timeout: Duration) -> bool {
        self.run(cmd, args, timeout).map(|o| o.success).unwrap_or(false)
    }
}

/// Credential lookups for automation actions
pub trait SecretSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;

    /// Lookup that treats a missing secret as an error
    fn require(&self, key: &str) -> Result<String, ExecutionError> {
        self.lookup(key)
            .ok_or_else(|| ExecutionError::MissingSecret(key.to_string()))
    }
}

/// In-memory secret source, for tests and for env-seeded stores
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    secrets: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new(secrets: BTreeMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.secrets.insert(key.to_string(), value.to_string());
    }
}

impl SecretSource for StaticSecrets {
    fn lookup(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_secrets_lookup() {
        let mut secrets = StaticSecrets::default();
        secrets.insert("deploy_token", "hunter2");

        assert_eq!(secrets.lookup("deploy_token").as_deref(), Some("hunter2"));
        assert!(secrets.lookup("missing").is_none());
        assert!(matches!(
            secrets.require("missing"),
            Err(ExecutionError::MissingSecret(_))
        ));
    }
}
