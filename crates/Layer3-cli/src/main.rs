//! distrual - hub with an interactive operator shell

mod display;
mod shell;

use clap::Parser;
use distrual_foundation::{Error, HubConfig};
use distrual_hub::{CallDispatcher, Hub, HubEvents};
use shell::ShellCommand;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the node binary looked up next to this executable
const NODE_BINARY: &str = "distrual-node";

/// How long to keep printing after shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// distrual - supervise a pool of node processes
#[derive(Parser, Debug)]
#[command(name = "distrual")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (.toml or .json), applied over global and project config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of live children
    #[arg(long)]
    max_children: Option<usize>,

    /// Program started by `spawn`
    #[arg(long)]
    node_program: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is the operator display
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = HubConfig::load(args.config.as_deref())?;
    if let Some(max) = args.max_children {
        config = config.with_max_children(max);
    }
    if let Some(program) = args.node_program {
        config = config.with_node_program(program);
    } else if config.node_program.is_none() {
        if let Some(program) = sibling_node_binary() {
            config = config.with_node_program(program);
        }
    }
    tracing::debug!(?config, "Loaded configuration");

    let shutdown_timeout = config.shutdown_timeout();
    let (hub, events) = Hub::new(config);
    let printer = tokio::spawn(print_events(events));

    // Children are stopped however the shell ends
    if let Err(e) = run_shell(&hub).await {
        tracing::warn!("Shell stopped: {}", e);
    }

    if !hub.is_empty() {
        tracing::debug!(children = hub.len(), "Stopping children");
    }
    let remaining = hub.shutdown(shutdown_timeout).await;
    if remaining > 0 {
        eprintln!("{} children did not exit in time", remaining);
    }
    drop(hub);
    let _ = tokio::time::timeout(FLUSH_TIMEOUT, printer).await;

    // The stdin reader thread cannot be cancelled; do not wait for it
    std::process::exit(0);
}

async fn print_events(mut events: HubEvents) {
    while let Some(event) = events.recv().await {
        println!("{}", display::render(&event));
    }
}

fn sibling_node_binary() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(format!("{}{}", NODE_BINARY, std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}

// ============================================================================
// Shell
// ============================================================================

async fn run_shell(hub: &Hub) -> anyhow::Result<()> {
    let dispatcher = CallDispatcher::new(hub.clone());
    let interactive = std::io::stdin().is_terminal();
    let mut input = BufReader::new(tokio::io::stdin());
    let mut buf = Vec::with_capacity(256);

    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }

        let line = tokio::select! {
            line = shell::read_line(&mut input, &mut buf) => match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        // End of input behaves like `exit`
        let Some(line) = line else {
            break;
        };

        match shell::parse(&line) {
            Ok(None) => {}
            Ok(Some(ShellCommand::Exit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = execute(hub, &dispatcher, command).await {
                    println!("{}", reason(&e));
                }
            }
            Err(e) => println!("{}", reason(&e)),
        }
    }

    Ok(())
}

async fn execute(
    hub: &Hub,
    dispatcher: &CallDispatcher,
    command: ShellCommand,
) -> distrual_foundation::Result<()> {
    match command {
        ShellCommand::Create { program, args } => {
            println!("Executable: {} - Arguments: {}", program, args.join(" "));
            hub.spawn(&program, args.as_slice())?;
        }
        ShellCommand::Spawn { port } => {
            let program = hub.config().node_program.clone().ok_or_else(|| {
                Error::Config("No node program configured, use --node-program".to_string())
            })?;
            let args: Vec<String> = match port {
                Some(port) => vec!["--port".to_string(), port.to_string()],
                None => Vec::new(),
            };
            hub.spawn(&program.to_string_lossy(), args.as_slice())?;
        }
        ShellCommand::Kill(id) => hub.kill(id)?,
        ShellCommand::List => println!("{}", display::render_children(&hub.describe())),
        ShellCommand::Example { from, to, x } => {
            let correlation = dispatcher
                .invoke_when_ready(from, to, x, hub.config().handshake_timeout())
                .await?;
            println!("Sent Example({}) from {} to {} as #{}", x, from, to, correlation);
        }
        ShellCommand::Send { id, text } => hub.send(id, &text).await?,
        ShellCommand::Close(id) => hub.close_stdin(id).await?,
        ShellCommand::Snapshot(id) => {
            let correlation = dispatcher.request_snapshot(id).await?;
            println!("Requested snapshot from {} as #{}", id, correlation);
        }
        ShellCommand::Help => println!("{}", shell::HELP),
        ShellCommand::Exit => {}
    }
    Ok(())
}

/// Operator-facing text for a rejected command
fn reason(error: &Error) -> String {
    match error {
        Error::InvalidInput(message) => message.clone(),
        Error::LaunchFailed { .. } => format!("Failed to start process, {}", error),
        other if other.is_user_facing() => other.to_string(),
        other => format!("Error: {}", other),
    }
}
