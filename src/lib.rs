pub mod config;
pub mod error;
pub mod executor;
pub mod ini;
pub mod ports;
pub mod profile;
pub mod selector;
pub mod state;

pub use config::{Config, Profile};
pub use error::{CommandError, ConfigError, QueryError};
pub use executor::{ExecutionReport, Executor};
pub use ports::{AvailablePorts, DisplayQuery, PortQuery};
pub use selector::{Choice, Choices, MenuSelector, PromptSelector, Selection, Selector};
pub use state::StateStore;

use anyhow::{Context, Result};
use profile::ProfileInfo;
use tracing::{info, warn};

pub struct Chrandr<Q> {
    config: Config,
    query: Q,
    executor: Executor,
    state: StateStore,
}

impl<Q: PortQuery> Chrandr<Q> {
    pub fn new(config: Config, query: Q, executor: Executor, state: StateStore) -> Self {
        Self {
            config,
            query,
            executor,
            state,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn available_ports(&self) -> Result<AvailablePorts, QueryError> {
        self.query.connected_ports().await
    }

    /// Every profile with ineligible ones disabled. A failed display query
    /// disables everything instead of failing.
    pub async fn choices(&self) -> Choices {
        let (ports, warning) = match self.available_ports().await {
            Ok(ports) => (ports, None),
            Err(e) => {
                warn!("Display query failed, no profile can be selected: {}", e);
                (AvailablePorts::default(), Some(e.to_string()))
            }
        };
        let query_ok = warning.is_none();

        let items: Vec<Choice> = self
            .config
            .profiles()
            .iter()
            .map(|profile| Choice {
                id: profile.id.clone(),
                title: profile.title.clone(),
                icon: profile.icon.clone(),
                enabled: query_ok && profile.is_eligible(&ports),
            })
            .collect();

        let preselected = if query_ok {
            let state = self.state.load();
            state::initial_selection(&self.config, &state, &ports)
                .and_then(|id| items.iter().position(|c| c.id == id))
        } else {
            None
        };

        Choices {
            items,
            preselected,
            warning,
        }
    }

    /// Runs the profile's commands and remembers it as the active one,
    /// unless the run was aborted or only simulated.
    pub async fn apply(&self, id: &str) -> Result<ExecutionReport> {
        let profile = self
            .config
            .profile(id)
            .with_context(|| format!("Profile '{}' not found", id))?;

        let report = self.executor.run(profile).await;

        if report.aborted {
            warn!("Profile '{}' was not fully applied", id);
        } else if report.dry_run {
            info!("Dry run, state not saved");
        } else {
            self.state.save(id)?;
        }

        Ok(report)
    }

    /// Like [`Chrandr::apply`], but refuses profiles whose ports are not all
    /// connected.
    pub async fn apply_eligible(&self, id: &str) -> Result<ExecutionReport> {
        let profile = self
            .config
            .profile(id)
            .with_context(|| format!("Profile '{}' not found", id))?;

        let ports = self
            .available_ports()
            .await
            .context("Cannot check which ports are connected")?;

        if !profile.is_eligible(&ports) {
            anyhow::bail!(
                "Profile '{}' needs ports that are not connected: {}",
                id,
                profile.missing_ports(&ports).join(", ")
            );
        }

        self.apply(id).await
    }

    /// Applies the `prefer` profile of the general section.
    pub async fn apply_preferred(&self) -> Result<ExecutionReport> {
        let id = self
            .config
            .general
            .prefer
            .clone()
            .context("No preferred profile: set 'prefer' in the [general] section")?;
        info!("Applying preferred profile '{}'", id);
        self.apply_eligible(&id).await
    }

    /// Shows the selector until the user picks a profile or cancels.
    pub async fn run_interactive<S: Selector>(
        &self,
        selector: &mut S,
    ) -> Result<Option<ExecutionReport>> {
        loop {
            let choices = self.choices().await;
            match selector.select(&choices).await? {
                Selection::Apply(id) => return self.apply(&id).await.map(Some),
                Selection::Refresh => info!("Refreshing available profiles"),
                Selection::Cancel => return Ok(None),
            }
        }
    }

    /// Every profile and, when the query worked, the connected ports.
    pub async fn profile_infos(&self) -> (Vec<ProfileInfo>, Option<AvailablePorts>) {
        let ports = match self.available_ports().await {
            Ok(ports) => Some(ports),
            Err(e) => {
                warn!("Display query failed: {}", e);
                None
            }
        };
        let state = self.state.load();
        let infos = profile::profile_infos(&self.config, ports.as_ref(), state.active.as_deref());
        (infos, ports)
    }
}
