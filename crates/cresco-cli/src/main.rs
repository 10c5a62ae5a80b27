//! Cresco CLI - operator front end for the Cresco control-plane client.
//!
//! Connects to an agent's websocket API and issues a single command: resolve
//! the global controller, send a message to any destination, tail an agent's
//! log, or attach to a data-plane stream.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use cresco_core::{CrescoClient, TlsMode};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cresco")]
#[command(about = "Command-line client for the Cresco control plane")]
struct Args {
    /// Agent host to connect to
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Agent websocket port
    #[arg(short, long, default_value = "8282")]
    port: u16,

    /// Service key presented on connect
    #[arg(short = 'k', long)]
    service_key: String,

    /// Use plain ws:// instead of wss://
    #[arg(long, conflicts_with = "verify_tls")]
    plain: bool,

    /// Verify the server certificate
    #[arg(long)]
    verify_tls: bool,

    /// Call timeout in seconds
    #[arg(short, long, default_value = "8")]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the global controller's region and agent
    GlobalInfo,

    /// Send one message and print the reply
    Call {
        /// Destination shape
        #[arg(long, value_enum)]
        target: Target,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        agent: Option<String>,

        #[arg(long)]
        plugin: Option<String>,

        /// Message event type, e.g. EXEC or CONFIG
        #[arg(long, default_value = "EXEC")]
        event_type: String,

        /// JSON object payload
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Fire-and-forget instead of waiting for a reply
        #[arg(long)]
        notify: bool,
    },

    /// Tail an agent's log stream
    Logs {
        #[arg(long)]
        region: String,

        #[arg(long)]
        agent: String,

        #[arg(long, default_value = "Trace")]
        level: String,

        /// Logger class to follow
        #[arg(long, default_value = "default")]
        class: String,

        /// How long to stay attached
        #[arg(long, default_value = "30")]
        seconds: u64,
    },

    /// Attach to a data-plane stream and print what arrives
    Dataplane {
        /// Filter expression, e.g. "stream_name='abc'"
        #[arg(long)]
        query: String,

        #[arg(long, default_value = "30")]
        seconds: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Target {
    Controller,
    Agent,
    Plugin,
    PluginAt,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let tls = if args.plain {
        TlsMode::Plain
    } else if args.verify_tls {
        TlsMode::Verified
    } else {
        TlsMode::Unverified
    };

    let client = CrescoClient::builder(args.host.as_str(), args.port, args.service_key.as_str())
        .tls(tls)
        .rpc_timeout(Duration::from_secs(args.timeout))
        .build()?;

    info!("Connecting to {}:{}", args.host, args.port);
    let session = client.connection()?;

    match args.command {
        Command::GlobalInfo => commands::global_info(&session),
        Command::Call {
            target,
            region,
            agent,
            plugin,
            event_type,
            payload,
            notify,
        } => commands::call(
            &session,
            commands::CallArgs {
                target,
                region,
                agent,
                plugin,
                event_type,
                payload,
                notify,
            },
        ),
        Command::Logs {
            region,
            agent,
            level,
            class,
            seconds,
        } => commands::logs(&session, &region, &agent, &level, &class, seconds),
        Command::Dataplane { query, seconds } => commands::dataplane(&session, &query, seconds),
    }
}
