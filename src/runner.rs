//! Subprocess runner with explicit timeouts
//!
//! Every external call the engine makes (package manager, service manager,
//! hostname tools) is a synchronous subprocess with a deadline. Running
//! past the deadline kills the child and reports a normal, retryable
//! failure.

use declarative::{CommandOutput, CommandRunner, ExecutionError};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs commands on the host
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError> {
        let rendered = format!("{cmd} {}", args.join(" "));
        log::debug!("running `{rendered}` (timeout {}s)", timeout.as_secs());

        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => {
                    let output = child.wait_with_output().map_err(|source| {
                        ExecutionError::Spawn {
                            command: rendered.clone(),
                            source,
                        }
                    })?;
                    return Ok(output.into());
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecutionError::Timeout {
                            command: rendered,
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(ExecutionError::Spawn {
                        command: rendered,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output() {
        let output = HostRunner
            .run("echo", &["hello"], Duration::from_secs(5))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout_str().trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let output = HostRunner
            .run("false", &[], Duration::from_secs(5))
            .unwrap();
        assert!(!output.success);
    }

    #[test]
    fn test_timeout_kills_the_child() {
        let started = Instant::now();
        let result = HostRunner.run("sleep", &["5"], Duration::from_millis(200));

        assert!(matches!(result, Err(ExecutionError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_missing_binary_is_a_spawn_error() {
        let result = HostRunner.run(
            "definitely-not-a-real-binary",
            &[],
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ExecutionError::Spawn { .. })));
    }
}
