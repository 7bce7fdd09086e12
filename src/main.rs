#![forbid(unsafe_code)]

//! `agent-warden` launches coding agents in tmux sessions and supervises
//! them until completion.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_warden::config::GlobalConfig;
use agent_warden::models::agent::AgentStatus;
use agent_warden::models::codebase::Codebase;
use agent_warden::models::launch::LaunchRequest;
use agent_warden::multiplexer::TmuxMultiplexer;
use agent_warden::orchestrator::Supervisor;
use agent_warden::persistence::db;
use agent_warden::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-warden", about = "Supervise coding agents in tmux sessions", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct LaunchArgs {
    /// Caller-side execution identifier.
    #[arg(long)]
    execution_id: String,
    /// Registered codebase to run in.
    #[arg(long)]
    codebase: String,
    /// Role label recorded on the agent.
    #[arg(long)]
    role: String,
    /// Instruction passed to the agent.
    #[arg(long)]
    prompt: String,
    /// Model override.
    #[arg(long)]
    model: Option<String>,
}

impl From<LaunchArgs> for LaunchRequest {
    fn from(args: LaunchArgs) -> Self {
        Self {
            execution_id: args.execution_id,
            codebase_id: args.codebase,
            prompt: args.prompt,
            role: args.role,
            model: args.model,
        }
    }
}

#[derive(Debug, Subcommand)]
enum CodebaseCommand {
    /// Register or replace a codebase.
    Add {
        /// Codebase identifier.
        id: String,
        /// Working tree path.
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage codebases agents can be launched in.
    Codebase {
        #[command(subcommand)]
        action: CodebaseCommand,
    },
    /// Launch an agent and wait for it to finish.
    Run(LaunchArgs),
    /// Launch an agent and post its final state to a webhook.
    Start {
        #[command(flatten)]
        launch: LaunchArgs,
        /// URL receiving the final state.
        #[arg(long)]
        callback_url: String,
    },
    /// Sample an agent once.
    Ping {
        /// Agent identifier.
        agent_id: String,
    },
    /// Watch an agent until it finishes.
    Watch {
        /// Agent identifier.
        agent_id: String,
    },
    /// Kill an agent's session.
    Kill {
        /// Agent identifier.
        agent_id: String,
    },
    /// Show an agent record.
    Show {
        /// Agent identifier.
        agent_id: String,
    },
    /// List agents by status.
    List {
        /// Status to filter on (preparing, launched, running, completed, failed).
        #[arg(long, default_value = "running")]
        status: String,
    },
    /// Print an agent's event trail.
    Events {
        /// Agent identifier.
        agent_id: String,
    },
    /// Print the latest events across all agents.
    Recent {
        /// Number of events to print.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let config = Arc::new(config);

    let database = Arc::new(db::connect(&config.db_path).await?);
    let supervisor = Supervisor::new(
        Arc::clone(&config),
        database,
        Arc::new(TmuxMultiplexer::default()),
    )?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    match args.command {
        Command::Codebase {
            action: CodebaseCommand::Add { id, path },
        } => {
            let path = path
                .canonicalize()
                .map_err(|err| AppError::Config(format!("invalid codebase path: {err}")))?;
            let codebase = Codebase { id, path };
            supervisor.register_codebase(&codebase).await?;
            print_json(&codebase)
        }
        Command::Run(launch) => {
            let record = supervisor
                .launch_and_wait(&launch.into(), &cancel)
                .await?;
            print_json(&record)
        }
        Command::Start {
            launch,
            callback_url,
        } => {
            let handle = supervisor
                .start_and_notify(&launch.into(), &callback_url, cancel.clone())
                .await?;
            print_json(&handle.launch)?;
            match handle.task.await {
                Ok(Ok(outcome)) => info!(?outcome, "callback flow finished"),
                Ok(Err(err)) => warn!(%err, "callback flow ended without delivery"),
                Err(err) => warn!(%err, "callback task panicked"),
            }
            Ok(())
        }
        Command::Ping { agent_id } => print_json(&supervisor.ping(&agent_id).await?),
        Command::Watch { agent_id } => print_json(&supervisor.watch(&agent_id, &cancel).await?),
        Command::Kill { agent_id } => print_json(&supervisor.kill(&agent_id).await?),
        Command::Show { agent_id } => print_json(&supervisor.agent(&agent_id).await?),
        Command::List { status } => {
            let status: AgentStatus = status
                .parse()
                .map_err(|_| AppError::Validation(format!("unknown status: {status}")))?;
            print_json(&supervisor.list(status).await?)
        }
        Command::Events { agent_id } => print_json(&supervisor.events(&agent_id).await?),
        Command::Recent { limit } => print_json(&supervisor.recent_events(limit).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to render output: {err}")))?;
    println!("{text}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
