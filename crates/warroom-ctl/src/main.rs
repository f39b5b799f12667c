//! warroomctl - report agent activity to a war room from the shell.
//!
//! Each invocation opens a client, publishes one or more events, waits for
//! them to be delivered (bounded by `--flush-timeout`) and exits non-zero if
//! anything is still undelivered.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use warroom::{AgentStatus, Client, ClientConfig, DeliveryStats, LogKind};

const APP_NAME: &str = "warroom";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    let config_path = cli.common.config_path();
    debug!("using config file {:?}", config_path);

    match cli.command {
        Command::Config { command } => handle_config(&cli.common, config_path.as_deref(), command),
        command => {
            let config = load_config(&cli.common, config_path.as_deref())?;
            let client = Client::new(config).context("creating war room client")?;
            let outcome = run_command(&client, command, cli.common.json).await;
            finish(&client, &cli.common).await?;
            outcome
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "warroomctl",
    author,
    version,
    about = "Report agent status, logs and timeline messages to a war room."
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Path to config file (defaults to <config dir>/warroom/config.toml)
    #[arg(long, short = 'c', env = "WARROOM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Room ID
    #[arg(long, global = true)]
    room: Option<String>,

    /// Display name to report as
    #[arg(long, global = true)]
    member: Option<String>,

    /// War room server URL
    #[arg(long, short = 's', global = true)]
    server: Option<String>,

    /// Seconds to wait for queued events before giving up
    #[arg(long, default_value = "5", global = true)]
    flush_timeout: u64,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable ANSI colors in log output
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

impl CommonOpts {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml")))
    }

    fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message to the team timeline
    Message {
        /// Message text
        content: String,
    },

    /// Register an agent and print its ID
    Register {
        /// Agent name shown on the canvas
        name: String,

        /// Total number of steps the agent expects to run
        #[arg(long)]
        total_steps: Option<u32>,
    },

    /// Update an agent's status
    Update {
        /// Agent ID returned by `register`
        agent_id: String,

        /// idle, running, paused, error or complete
        status: String,

        /// Free-form progress text (e.g. "Round 3/10")
        #[arg(long)]
        progress: Option<String>,

        /// Accumulated cost in USD
        #[arg(long)]
        cost: Option<f64>,
    },

    /// Append a log entry to an agent
    Log {
        /// Agent ID returned by `register`
        agent_id: String,

        /// Log text
        content: String,

        /// llm_call, tool_use, reflection, error or output
        #[arg(long, default_value = "output")]
        kind: String,

        /// JSON object attached to the entry
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Mark an agent as complete
    Complete {
        /// Agent ID returned by `register`
        agent_id: String,
    },

    /// Run a simulated agent that reports progress step by step
    Demo {
        /// Agent name
        #[arg(long, default_value = "demo-agent")]
        name: String,

        /// Number of steps to simulate
        #[arg(long, default_value = "10")]
        steps: u32,

        /// Delay between steps in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn init_logging(common: &CommonOpts) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = common.log_level();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warroom={level},warroomctl={level}")));

    if common.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr),
            )
            .try_init()
            .ok();
    } else {
        let disable_color = common.no_color
            || std::env::var_os("NO_COLOR").is_some()
            || !io::stderr().is_terminal();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(!disable_color)
                    .with_writer(io::stderr),
            )
            .try_init()
            .ok();
    }
}

fn load_config(common: &CommonOpts, path: Option<&Path>) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(path).context("loading configuration")?;
    apply_overrides(&mut config, common);
    config.validate().context(
        "invalid configuration (set room and member via --room/--member, \
         WARROOM__ROOM/WARROOM__MEMBER or the config file)",
    )?;
    Ok(config)
}

fn apply_overrides(config: &mut ClientConfig, common: &CommonOpts) {
    if let Some(room) = &common.room {
        config.room = room.clone();
    }
    if let Some(member) = &common.member {
        config.member = member.clone();
    }
    if let Some(server) = &common.server {
        config.server = server.clone();
    }
}

async fn run_command(client: &Client, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Message { content } => {
            client.message(content).await;
            Ok(())
        }
        Command::Register { name, total_steps } => {
            let agent = client.register(name, total_steps).await;
            if json {
                print_json(&json!({ "agentId": agent.id(), "name": agent.name() }))?;
            } else {
                println!("{}", agent.id());
            }
            Ok(())
        }
        Command::Update {
            agent_id,
            status,
            progress,
            cost,
        } => {
            let status = AgentStatus::from(status);
            if let AgentStatus::Other(value) = &status {
                warn!("'{}' is not a known agent status, sending as-is", value);
            }
            client
                .attach(agent_id, "")
                .update(status, progress, cost)
                .await;
            Ok(())
        }
        Command::Log {
            agent_id,
            content,
            kind,
            metadata,
        } => {
            let metadata = parse_metadata(metadata.as_deref())?;
            client
                .attach(agent_id, "")
                .log_with(content, LogKind::from(kind), metadata)
                .await;
            Ok(())
        }
        Command::Complete { agent_id } => {
            client.attach(agent_id, "").complete().await;
            Ok(())
        }
        Command::Demo {
            name,
            steps,
            interval_ms,
        } => run_demo(client, name, steps, Duration::from_millis(interval_ms), json).await,
        Command::Config { .. } => unreachable!("config commands run without a client"),
    }
}

async fn run_demo(
    client: &Client,
    name: String,
    steps: u32,
    interval: Duration,
    json: bool,
) -> Result<()> {
    let agent = client.register(name, Some(steps)).await;
    info!("registered demo agent {}", agent.id());
    if !json {
        println!("{}", agent.id());
    }

    for step in 1..=steps {
        agent
            .update(
                AgentStatus::Running,
                Some(format!("Round {step}/{steps}")),
                None,
            )
            .await;
        agent.log(format!("Processing round {step}")).await;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let progress = format!("Interrupted at {step}/{steps}");
                agent.update(AgentStatus::Paused, Some(progress), None).await;
                warn!("demo interrupted at step {}", step);
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    agent.complete().await;
    if json {
        print_json(&json!({ "agentId": agent.id(), "steps": steps }))?;
    }
    Ok(())
}

/// Flush, close, and fail if anything is left undelivered.
async fn finish(client: &Client, common: &CommonOpts) -> Result<()> {
    let delivered = client
        .flush(Duration::from_secs(common.flush_timeout))
        .await;
    client.close();

    let stats = client.stats();
    debug!("delivery stats: {:?}", stats);
    if common.json {
        print_json(&stats_json(&stats))?;
    }

    if !delivered || stats.queue_len > 0 {
        bail!(
            "{} event(s) could not be delivered to {}",
            stats.queue_len,
            client.session().server()
        );
    }
    Ok(())
}

fn stats_json(stats: &DeliveryStats) -> Value {
    json!({ "stats": stats })
}

fn parse_metadata(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("parsing --metadata as JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--metadata must be a JSON object, got {other}"),
    }
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{text}");
    Ok(())
}

fn handle_config(common: &CommonOpts, path: Option<&Path>, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            let path = path.context("no config directory available; pass --config")?;
            if path.exists() && !force {
                bail!(
                    "config file {} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let mut config = ClientConfig::default();
            apply_overrides(&mut config, common);
            write_default_config(path, &config)?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let mut config = ClientConfig::load(path).context("loading configuration")?;
            apply_overrides(&mut config, common);
            if common.json {
                print_json(&serde_json::to_value(&config).context("serializing config")?)
            } else {
                let text = toml::to_string_pretty(&config).context("serializing config")?;
                print!("{text}");
                Ok(())
            }
        }
    }
}

fn write_default_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml = toml::to_string_pretty(config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# Environment overrides use WARROOM__<SECTION>__<KEY>, e.g. WARROOM__ROOM\n\n");
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
