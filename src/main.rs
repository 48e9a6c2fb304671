//! Mob - builds third-party dependencies by supervising external commands.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mob::config::{ConfigLoader, MobConfig};
use mob::env::Env;
use mob::process::{ExitOutcome, ProcessSpec, ProcessSupervisor, RunFlags, RunOptions};

#[derive(Parser)]
#[command(
    name = "mob",
    about = "Builds third-party dependencies by supervising external commands",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log commands without running them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command under supervision; several commands are piped together.
    Run {
        /// Command text, handed to the command interpreter as is.
        #[arg(required = true)]
        commands: Vec<String>,
        /// Working directory, created if missing.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Name used in error messages.
        #[arg(long)]
        name: Option<String>,
        /// Set an environment variable (KEY=VALUE).
        #[arg(long = "env", value_parser = parse_env_var)]
        env: Vec<(String, String)>,
        /// Start from an empty environment instead of the current one.
        #[arg(long)]
        clear_env: bool,
        /// Do not fail when the command exits nonzero.
        #[arg(long)]
        allow_failure: bool,
        /// Kill the command on Ctrl-C instead of interrupting it.
        #[arg(long)]
        terminate_on_interrupt: bool,
    },
    /// Print the effective configuration.
    Config,
}

fn parse_env_var(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// The effective configuration and the file it came from, if any.
fn load_config(cli: &Cli) -> Result<(MobConfig, Option<PathBuf>), mob::config::ConfigError> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let source = loader.find_config_file();
    let mut config = loader.load()?;

    config.dry_run |= cli.dry_run;
    config.verbose |= cli.verbose >= 3;

    Ok((config, source))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (config, source) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Config => match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                match source {
                    Some(path) => println!("# loaded from {}", path.display()),
                    None => println!("# defaults (no config file found)"),
                }
                print!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to render configuration");
                ExitCode::FAILURE
            }
        },
        Commands::Run {
            commands,
            cwd,
            name,
            env,
            clear_env,
            allow_failure,
            terminate_on_interrupt,
        } => {
            let mut stages = commands.into_iter().map(ProcessSpec::raw);
            let Some(first) = stages.next() else {
                return ExitCode::FAILURE;
            };
            let mut spec = ProcessSpec::pipe(first, stages).flags(RunFlags {
                allow_failure,
                terminate_on_interrupt,
            });

            if let Some(cwd) = cwd {
                spec = spec.cwd(cwd);
            }
            if let Some(name) = name {
                spec = spec.name(name);
            }
            if clear_env || !env.is_empty() {
                let base = if clear_env { Env::new() } else { Env::current() };
                let env = env
                    .into_iter()
                    .fold(base, |env, (key, value)| env.set(key, value));
                spec = spec.env(env);
            }

            run(spec, &RunOptions::from_config(&config)).await
        }
    }
}

async fn run(spec: ProcessSpec, options: &RunOptions) -> ExitCode {
    let mut supervisor = ProcessSupervisor::with_tracing(spec);

    let handle = supervisor.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping process");
            handle.interrupt();
        }
    });

    match supervisor.execute(options).await {
        Ok(ExitOutcome::Success | ExitOutcome::NotStarted) => ExitCode::SUCCESS,
        Ok(ExitOutcome::AllowedFailure(code)) => {
            tracing::info!(code, "Command failed, failure was allowed");
            ExitCode::SUCCESS
        }
        Ok(ExitOutcome::Interrupted(_) | ExitOutcome::Killed) => ExitCode::from(130),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
