use crate::config::{FailurePolicy, General, Profile};
use crate::error::CommandError;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct StepReport {
    pub command: String,
    pub outcome: Result<(), CommandError>,
}

/// What happened when a profile's command block ran.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub steps: Vec<StepReport>,
    /// Set when `on_failure = abort` stopped the run early.
    pub aborted: bool,
    pub dry_run: bool,
}

impl ExecutionReport {
    pub fn failures(&self) -> impl Iterator<Item = &CommandError> {
        self.steps.iter().filter_map(|s| s.outcome.as_ref().err())
    }

    pub fn succeeded(&self) -> bool {
        !self.aborted && self.failures().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    shell: String,
    policy: FailurePolicy,
    timeout: Option<Duration>,
    dry_run: bool,
}

impl Executor {
    pub fn new(shell: impl Into<String>, policy: FailurePolicy) -> Self {
        Self {
            shell: shell.into(),
            policy,
            timeout: None,
            dry_run: false,
        }
    }

    pub fn from_general(general: &General) -> Self {
        Self::new(general.shell.clone(), general.on_failure).with_timeout(general.command_timeout)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs the command lines one after the other.
    pub async fn run(&self, profile: &Profile) -> ExecutionReport {
        info!("Applying profile '{}' ({})", profile.id, profile.title);

        let mut report = ExecutionReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        for command in &profile.commands {
            if self.dry_run {
                info!("[dry-run] {}", command);
                report.steps.push(StepReport {
                    command: command.clone(),
                    outcome: Ok(()),
                });
                continue;
            }

            let outcome = self.run_line(command).await;
            let failed = outcome.is_err();
            if let Err(e) = &outcome {
                warn!("{}", e);
            }
            report.steps.push(StepReport {
                command: command.clone(),
                outcome,
            });

            if failed && self.policy == FailurePolicy::Abort {
                warn!(
                    "Aborting profile '{}', {} command(s) left unexecuted",
                    profile.id,
                    profile.commands.len() - report.steps.len()
                );
                report.aborted = true;
                break;
            }
        }

        report
    }

    async fn run_line(&self, command: &str) -> Result<(), CommandError> {
        debug!("Executing command: {}", command);

        let cmd = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output();

        let result = match self.timeout {
            Some(limit) => match timeout(limit, cmd).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(CommandError::TimedOut {
                        command: command.to_string(),
                        after: limit,
                    });
                }
            },
            None => cmd.await,
        };

        let output = result.map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let mut combined = stdout.trim().to_string();
            if !stderr.trim().is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(stderr.trim());
            }
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: output.status,
                output: combined,
            });
        }

        if !stdout.trim().is_empty() {
            debug!("{}", stdout.trim());
        }
        Ok(())
    }
}
