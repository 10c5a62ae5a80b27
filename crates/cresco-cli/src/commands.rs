//! Subcommand implementations.

use crate::Target;
use anyhow::{anyhow, bail, Context, Result};
use cresco_core::{CrescoClient, LogLevel, Payload, StreamCallbacks};
use std::time::Duration;
use tracing::info;

pub struct CallArgs {
    pub target: Target,
    pub region: Option<String>,
    pub agent: Option<String>,
    pub plugin: Option<String>,
    pub event_type: String,
    pub payload: String,
    pub notify: bool,
}

pub fn global_info(client: &CrescoClient) -> Result<()> {
    match client.global_info()? {
        Some(info) => {
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        None => bail!("Global controller did not answer globalinfo"),
    }
}

pub fn call(client: &CrescoClient, args: CallArgs) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(&args.payload).context("--payload is not valid JSON")?;
    let payload = Payload::try_from(value)?;
    let is_rpc = !args.notify;
    let messaging = client.messaging();

    let required = |value: &Option<String>, flag: &str| -> Result<String> {
        value
            .clone()
            .ok_or_else(|| anyhow!("--{} is required for this target", flag))
    };

    let reply = match args.target {
        Target::Controller => messaging.to_controller(is_rpc, &args.event_type, payload, None)?,
        Target::Agent => messaging.to_agent(
            is_rpc,
            &args.event_type,
            payload,
            &required(&args.region, "region")?,
            &required(&args.agent, "agent")?,
            None,
        )?,
        Target::Plugin => messaging.to_plugin_by_name(
            is_rpc,
            &args.event_type,
            payload,
            &required(&args.plugin, "plugin")?,
            None,
        )?,
        Target::PluginAt => messaging.to_plugin_at(
            is_rpc,
            &args.event_type,
            payload,
            &required(&args.region, "region")?,
            &required(&args.agent, "agent")?,
            &required(&args.plugin, "plugin")?,
            None,
        )?,
    };

    if !reply.is_success() {
        bail!("Call {}", reply.outcome());
    }
    if is_rpc {
        println!("{}", serde_json::to_string_pretty(reply.body())?);
    } else {
        info!("Message dispatched");
    }
    Ok(())
}

pub fn logs(
    client: &CrescoClient,
    region: &str,
    agent: &str,
    level: &str,
    class: &str,
    seconds: u64,
) -> Result<()> {
    let level: LogLevel = level.parse()?;
    let streamer = client.get_logstreamer(StreamCallbacks::new().on_text(|line| println!("{}", line)))?;
    streamer.connect()?;
    streamer.update_config_class(region, agent, level, class)?;

    info!("Following {}/{} for {}s", region, agent, seconds);
    std::thread::sleep(Duration::from_secs(seconds));
    streamer.close();
    Ok(())
}

pub fn dataplane(client: &CrescoClient, query: &str, seconds: u64) -> Result<()> {
    let callbacks = StreamCallbacks::new()
        .on_text(|text| println!("{}", text))
        .on_binary(|data| println!("<{} bytes>", data.len()));
    let dataplane = client.get_dataplane(query, callbacks)?;
    dataplane.connect()?;

    info!("Attached to data plane for {}s", seconds);
    std::thread::sleep(Duration::from_secs(seconds));
    dataplane.close();
    Ok(())
}
