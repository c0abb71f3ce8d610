//! nvim-attach - drive a running Neovim from the command line.
//!
//! Connects to the editor named by `--server` (or `$NVIM` when run inside
//! one), or starts a private `nvim --embed`, then runs one command and
//! prints its result as JSON.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::process::Child;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nvim_attach::config::TIMEOUT_ENV;
use nvim_attach::{connect, Buffer, Session, SessionConfig, Value};

/// Per-call timeout when neither `--timeout` nor the environment sets one.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "nvim-attach", about = "Talk to Neovim over msgpack-RPC", version)]
struct Cli {
    /// Socket path or host:port of a listening editor. Defaults to $NVIM.
    #[arg(long, short, conflicts_with = "embed")]
    server: Option<String>,

    /// Start a headless `nvim --embed` instead of connecting.
    #[arg(long)]
    embed: bool,

    /// Program started by --embed.
    #[arg(long, default_value = "nvim")]
    nvim: String,

    /// Per-call timeout in seconds; 0 waits forever. Defaults to 30.
    #[arg(long)]
    timeout: Option<u64>,

    /// Connection attempts before giving up.
    #[arg(long, default_value_t = 1)]
    retries: u32,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Evaluate a Vimscript expression.
    Eval { expr: String },
    /// Run an Ex command and print what it outputs.
    Exec { command: String },
    /// Call any remote method; each argument is parsed as JSON.
    Call { method: String, args: Vec<String> },
    /// List buffers and their names.
    Buffers,
    /// Print lines of a buffer (the current one by default).
    Lines {
        #[arg(long)]
        buffer: Option<i64>,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        start: i64,
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        end: i64,
    },
    /// Subscribe to events and print notifications until interrupted.
    Listen {
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Summarize the remote API and check it against the built-in tables.
    Api,
    /// List sockets of running editors.
    Servers,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries results.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "nvim_attach=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    if let Cmd::Servers = cli.command {
        list_servers();
        return Ok(());
    }

    let mut config = SessionConfig::from_env();
    let timeout = match cli.timeout {
        Some(secs) => Some(secs),
        None if std::env::var_os(TIMEOUT_ENV).is_none() => Some(DEFAULT_TIMEOUT_SECS),
        None => None,
    };
    if let Some(secs) = timeout {
        config = config.with_call_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }

    let (session, child) = open(&cli, config).await?;
    let result = run(&session, cli.command).await;

    if child.is_some() {
        if let Err(e) = session.nvim().quit().await {
            warn!("Embedded editor did not quit cleanly: {}", e);
        }
    }
    session.close();
    result
}

async fn open(cli: &Cli, config: SessionConfig) -> Result<(Session, Option<Child>)> {
    if cli.embed {
        let (session, child) = connect::spawn_embedded(&cli.nvim, &["--headless"], config)
            .await
            .with_context(|| format!("Failed to start {}", cli.nvim))?;
        return Ok((session, Some(child)));
    }

    let Some(addr) = cli.server.clone().or_else(connect::default_address) else {
        bail!("No editor address: pass --server, --embed, or run inside Neovim");
    };
    let session = connect::connect_with_retry(&addr, config, cli.retries)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    Ok((session, None))
}

async fn run(session: &Session, command: Cmd) -> Result<()> {
    let nvim = session.nvim();
    match command {
        Cmd::Eval { expr } => print_json(&nvim.eval(&expr).await?)?,
        Cmd::Exec { command } => {
            let output = nvim.command_output(&command).await?;
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Cmd::Call { method, args } => {
            let args = args
                .iter()
                .map(|raw| {
                    serde_json::from_str::<serde_json::Value>(raw)
                        .map(Value::from)
                        .with_context(|| format!("Argument is not JSON: {}", raw))
                })
                .collect::<Result<Vec<_>>>()?;
            print_json(&session.call(&method, args).await?)?;
        }
        Cmd::Buffers => {
            for buffer in nvim.get_buffers().await? {
                let name = buffer.get_name().await?;
                println!("{}\t{}", buffer.id(), if name.is_empty() { "[No Name]" } else { &name });
            }
        }
        Cmd::Lines { buffer, start, end } => {
            let buffer = match buffer {
                Some(id) => Buffer::new(session.clone(), id),
                None => nvim.get_current_buffer().await?,
            };
            for line in buffer.get_lines(start, end, false).await? {
                println!("{}", line);
            }
        }
        Cmd::Listen { events } => listen(session, &events).await?,
        Cmd::Api => {
            let api = nvim.api_info().await?;
            if let Some(version) = &api.version {
                info!("Remote version {}", version);
            }
            if let Err(e) = api.check_handle_types() {
                warn!("{}", e);
            }
            let missing = api.missing_methods();
            print_json(&serde_json::json!({
                "channel_id": api.channel_id,
                "version": api.version,
                "functions": api.functions.len(),
                "missing": missing,
            }))?;
        }
        Cmd::Servers => list_servers(),
    }
    Ok(())
}

async fn listen(session: &Session, events: &[String]) -> Result<()> {
    for event in events {
        let name = event.clone();
        session.on(event, move |args| {
            let line = serde_json::json!({ "event": name, "args": Value::Array(args) });
            println!("{}", line);
        });
        session
            .subscribe(event)
            .await
            .with_context(|| format!("Failed to subscribe to {}", event))?;
    }
    info!("Listening for {}", events.join(", "));

    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = poll.tick() => {
                if session.is_closed() {
                    info!("Editor closed the connection");
                    break;
                }
            }
        }
    }
    Ok(())
}

fn list_servers() {
    for path in connect::discover_sockets() {
        println!("{}", path.display());
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
