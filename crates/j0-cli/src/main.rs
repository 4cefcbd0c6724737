//! `j0`: interactive Judge0 execution sessions from the shell or over HTTP.
//!
//! Run with: cargo run -p j0-cli -- serve
//!
//! Then create a session with `curl -X POST localhost:8080/sessions -d '{"language":"bash"}'`.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use j0_core::{Session, SessionFilter, SessionId, SessionStatus};
use j0_executor::{ClientConfig, Judge0Client};
use j0_session::{FileStorage, SessionManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Manager = SessionManager<FileStorage, Judge0Client>;

#[derive(Parser, Debug)]
#[command(name = "j0")]
#[command(about = "Stateful code execution sessions on a Judge0 engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Judge0 base URL
    #[arg(
        long,
        global = true,
        env = "J0_JUDGE0_URL",
        default_value = j0_executor::config::DEFAULT_BASE_URL
    )]
    judge0_url: String,

    /// Directory holding session snapshots and logs
    #[arg(long, global = true, env = "J0_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Delay between result polls in milliseconds
    #[arg(long, global = true, default_value = "500")]
    poll_interval_ms: u64,

    /// Polls before giving up on a job
    #[arg(long, global = true, default_value = "30")]
    max_attempts: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Manage sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
    /// Execute code in a session
    Exec {
        id: SessionId,
        code: String,

        /// Standard input for the program
        #[arg(long)]
        stdin: Option<String>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage session environment variables
    #[command(subcommand)]
    Env(EnvCommands),
    /// Print the tail of a session log
    Log {
        id: SessionId,

        /// Number of trailing lines, 0 for the whole log
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
    },
    /// Show Judge0 server information and languages
    About,
    /// Print the agent tool definitions
    Tools,
}

#[derive(Subcommand, Debug)]
enum SessionCommands {
    /// Create a new session
    Create {
        language: String,

        /// Human-readable name
        #[arg(long)]
        name: Option<String>,
    },
    /// List sessions
    List {
        /// Print sessions as JSON
        #[arg(long)]
        json: bool,

        /// Only show sessions with this status
        #[arg(long)]
        status: Option<StatusArg>,
    },
    /// Show a session with its env and history
    Show { id: SessionId },
    /// Close a session
    Close { id: SessionId },
}

#[derive(Subcommand, Debug)]
enum EnvCommands {
    /// Set a variable for subsequent executions
    Set {
        id: SessionId,
        key: String,
        value: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Active,
    Closed,
}

impl From<StatusArg> for SessionStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Self::Active,
            StatusArg::Closed => Self::Closed,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

fn client_config(cli: &Cli) -> ClientConfig {
    ClientConfig::new(cli.judge0_url.as_str())
        .poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .max_attempts(cli.max_attempts)
}

async fn manager(cli: &Cli) -> anyhow::Result<Manager> {
    let engine = Judge0Client::new(client_config(cli)).context("Failed to build Judge0 client")?;
    let storage = FileStorage::open(&cli.data_dir)
        .await
        .with_context(|| format!("Failed to open data dir {}", cli.data_dir.display()))?;
    Ok(SessionManager::new(storage, engine))
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Serve { port, host } => {
            serve(Arc::new(manager(&cli).await?), host, *port).await?;
        }
        Commands::Sessions(command) => sessions(&manager(&cli).await?, command).await?,
        Commands::Exec {
            id,
            code,
            stdin,
            json,
        } => {
            let outcome = manager(&cli)
                .await?
                .execute(*id, code, stdin.as_deref())
                .await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", outcome.stdout);
                eprint!("{}", outcome.stderr);
            }
            if let Some(warning) = &outcome.warning {
                eprintln!("Warning: {warning}");
            }
            return Ok(exit_code(outcome.exit_code));
        }
        Commands::Env(EnvCommands::Set { id, key, value }) => {
            manager(&cli).await?.set_env(*id, key, value).await?;
            println!("{key} set");
        }
        Commands::Log { id, lines } => {
            print!("{}", manager(&cli).await?.get_log(*id, *lines).await?);
        }
        Commands::About => about(&cli).await?,
        Commands::Tools => {
            println!(
                "{}",
                serde_json::to_string_pretty(&j0_transport::tools::definitions())?
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(manager: Arc<Manager>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = j0_transport::router(manager);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")
}

async fn sessions(manager: &Manager, command: &SessionCommands) -> anyhow::Result<()> {
    match command {
        SessionCommands::Create { language, name } => {
            let session = manager.create_session(language, name.clone()).await?;
            println!("{}", session.id);
        }
        SessionCommands::List { json, status } => {
            let filter = SessionFilter {
                status: status.map(Into::into),
                ..SessionFilter::default()
            };
            let sessions = manager.list_sessions(filter).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No sessions");
            } else {
                for session in &sessions {
                    println!("{}", summary_line(session));
                }
            }
        }
        SessionCommands::Show { id } => {
            let session = manager.get_session(*id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionCommands::Close { id } => {
            manager.close_session(*id).await?;
            println!("{id} closed");
        }
    }
    Ok(())
}

async fn about(cli: &Cli) -> anyhow::Result<()> {
    let client = Judge0Client::new(client_config(cli))?;
    let info = client
        .about()
        .await
        .with_context(|| format!("Failed to reach Judge0 at {}", cli.judge0_url))?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    let languages = client.languages().await?;
    println!();
    println!("Supported by j0:");
    for language in j0_core::Language::ALL {
        let available = languages.iter().any(|l| l.id == language.engine_id());
        println!(
            "  {:<12} {:>3}  {}",
            language.name(),
            language.engine_id(),
            if available { "available" } else { "missing" }
        );
    }
    Ok(())
}

fn summary_line(session: &Session) -> String {
    format!(
        "{}  {:<10} {:<6} {:>3} runs  {}",
        session.id,
        session.language.name(),
        session.status,
        session.history.len(),
        session.name.as_deref().unwrap_or("-"),
    )
}

/// Process exit code mirroring the remote program's.
fn exit_code(remote: i32) -> ExitCode {
    if remote == 0 {
        return ExitCode::SUCCESS;
    }
    u8::try_from(remote)
        .ok()
        .filter(|code| *code != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
