use anyhow::Result;
use chrandr::config::Config;
use chrandr::{
    profile, Chrandr, DisplayQuery, ExecutionReport, Executor, MenuSelector, PromptSelector,
    StateStore,
};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "chrandr", version)]
#[command(about = "Change the screen configuration by picking a profile")]
struct Cli {
    /// Configuration file (default: ~/.config/chrandr/chrandr.conf)
    #[arg(short, long, env = "CHRANDR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose output messages
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log the commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// dmenu-style launcher used instead of the terminal prompt
    #[arg(long)]
    menu: Option<String>,

    /// Apply the preferred profile (`prefer` in [general]) without asking
    #[arg(long)]
    prefer: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// `--prefer` and `--menu` only make sense without a subcommand.
    fn check_conflicts(&self) -> Result<(), clap::Error> {
        let Some(command) = &self.command else {
            return Ok(());
        };
        let flag = if self.prefer {
            "--prefer"
        } else if self.menu.is_some() {
            "--menu"
        } else {
            return Ok(());
        };
        let name = match command {
            Commands::List { .. } => "list",
            Commands::Apply { .. } => "apply",
            Commands::Init { .. } => "init",
        };
        Err(Self::command().error(
            ErrorKind::ArgumentConflict,
            format!("'{}' cannot be used with the '{}' subcommand", flag, name),
        ))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List profiles and whether their ports are connected
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Apply one profile without asking
    Apply {
        /// Profile identifier (its section name)
        id: String,
        /// Apply even if some of its ports are not connected
        #[arg(long)]
        force: bool,
    },
    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    if let Err(e) = cli.check_conflicts() {
        e.exit();
    }

    init_tracing(cli.verbose)?;
    debug!("Parsed arguments: {:?}", cli);

    let config_path = cli.config.as_deref();
    let report = match cli.command {
        Some(Commands::Init { force }) => {
            let path = Config::generate_example(config_path, force)?;
            println!("Configuration written to {}", path.display());
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::List { json }) => {
            let app = build_app(config_path, cli.dry_run)?;
            let (infos, ports) = app.profile_infos().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                profile::print_list(&infos, ports.as_ref());
            }
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Apply { id, force }) => {
            let app = build_app(config_path, cli.dry_run)?;
            if force {
                app.apply(&id).await?
            } else {
                app.apply_eligible(&id).await?
            }
        }
        None if cli.prefer => build_app(config_path, cli.dry_run)?.apply_preferred().await?,
        None => {
            let app = build_app(config_path, cli.dry_run)?;
            let general = &app.config().general;
            let selected = match cli.menu.clone().or_else(|| general.menu.clone()) {
                Some(command) => {
                    let mut selector = MenuSelector::new(command, general.shell.clone());
                    app.run_interactive(&mut selector).await?
                }
                None => app.run_interactive(&mut PromptSelector::stdio()).await?,
            };
            match selected {
                Some(report) => report,
                None => {
                    info!("Nothing selected");
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
    };

    Ok(summarize(&report))
}

fn build_app(config_path: Option<&Path>, dry_run: bool) -> Result<Chrandr<DisplayQuery>> {
    let config = Config::load(config_path).map_err(|e| {
        let hint = match Config::resolve_path(config_path) {
            Ok(path) if !path.exists() => " (run `chrandr init` to create one)",
            _ => "",
        };
        anyhow::anyhow!("{}{}", e, hint)
    })?;

    let query = DisplayQuery::new(config.general.query);
    let executor = Executor::from_general(&config.general).dry_run(dry_run);
    let state = StateStore::for_config(&config)?;
    Ok(Chrandr::new(config, query, executor, state))
}

fn summarize(report: &ExecutionReport) -> ExitCode {
    let failed = report.failures().count();

    if report.aborted {
        error!(
            "Stopped after a failing command, {} command(s) were run",
            report.steps.len()
        );
        return ExitCode::FAILURE;
    }

    if failed > 0 {
        warn!("{} of {} command(s) failed", failed, report.steps.len());
    } else {
        info!("{} command(s) executed", report.steps.len());
    }
    ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    Ok(())
}
