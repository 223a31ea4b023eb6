//! Gateway signaling probe.
//!
//! Connects to a Janus gateway over WebSocket, establishes a session,
//! attaches the streaming plugin, and exercises the control surface: list
//! mountpoints, or watch one and print the events the gateway pushes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use janus_plugins::{StreamingEvent, StreamingPlugin};
use janus_session::{ClientConfig, ConnectionEvent, JanusClient, Plugin, WsTransport};

mod config;
mod logging;

use config::ProbeConfig;

/// Janus gateway signaling probe
#[derive(Parser, Debug)]
#[command(name = "janus-probe", version, about = "Janus gateway signaling probe")]
struct Args {
    /// Gateway WebSocket URL, e.g. ws://127.0.0.1:8188/
    #[arg(long)]
    url: Option<String>,

    /// Path to a YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// List available streaming mountpoints and exit
    #[arg(long)]
    list: bool,

    /// Watch a streaming mountpoint and print its events until ctrl-c
    #[arg(long)]
    watch: Option<u64>,

    /// Reconnect automatically when the gateway drops
    #[arg(long)]
    reconnect: bool,

    /// Connection attempt limit for reconnects (0 = unlimited)
    #[arg(long)]
    tries_limit: Option<u32>,

    /// Keepalive interval, e.g. 5s
    #[arg(long)]
    keep_alive_interval: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let mut probe_config = ProbeConfig::load(args.config.as_ref())?;
    if let Some(url) = args.url {
        probe_config.url = url;
    }
    if args.reconnect {
        probe_config.reconnect = true;
    }
    if let Some(limit) = args.tries_limit {
        probe_config.connection_tries_limit = limit;
    }

    let mut client_config: ClientConfig = probe_config.client_config()?;
    if let Some(interval) = args.keep_alive_interval {
        client_config.keep_alive_interval = interval.into();
    }

    let client = JanusClient::new(client_config, Arc::new(WsTransport));
    let mut connection_events = client.events();
    client.connect().await.context("cannot start connecting")?;

    // Wait for the session (or the terminal failure) before doing anything.
    loop {
        match connection_events.recv().await {
            Ok(ConnectionEvent::Open) => break,
            Ok(ConnectionEvent::ConnectError) => bail!("gateway is unreachable"),
            Ok(ConnectionEvent::Close) if !probe_config.reconnect => {
                bail!("gateway connection dropped")
            }
            Ok(_) => {}
            Err(error) => bail!("event stream ended: {error}"),
        }
    }
    info!(session = ?client.session_id().await, "connected to gateway");

    let streaming = StreamingPlugin::new();
    let mut streaming_events = streaming.events();
    let plugin: Arc<dyn Plugin> = streaming.clone();
    let handle_id = client.add_plugin(Arc::clone(&plugin)).await?;
    info!(handle_id, "streaming plugin attached");

    if args.list {
        let mountpoints = streaming.list().await?;
        if mountpoints.is_empty() {
            println!("no mountpoints");
        }
        for mountpoint in mountpoints {
            let id = mountpoint.get("id").and_then(|id| id.as_u64()).unwrap_or(0);
            let description = mountpoint
                .get("description")
                .and_then(|description| description.as_str())
                .unwrap_or("-");
            let kind = mountpoint
                .get("type")
                .and_then(|kind| kind.as_str())
                .unwrap_or("?");
            println!("{id:>6}  {kind:<10}  {description}");
        }
    }

    if let Some(id) = args.watch {
        let jsep = streaming.watch(id).await?;
        let sdp_len = jsep
            .get("sdp")
            .and_then(|sdp| sdp.as_str())
            .map(str::len)
            .unwrap_or(0);
        info!(mountpoint = id, sdp_len, "received offer, watching for events");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    break;
                }
                event = streaming_events.recv() => match event {
                    Ok(StreamingEvent::StatusChange(status)) => info!(%status, "stream status"),
                    Ok(event) => info!(?event, "streaming event"),
                    Err(error) => {
                        warn!("streaming event stream ended: {error}");
                        break;
                    }
                },
                event = connection_events.recv() => match event {
                    Ok(ConnectionEvent::Close) => warn!("gateway connection dropped"),
                    Ok(ConnectionEvent::Open) => info!("gateway connection is back"),
                    Ok(ConnectionEvent::Timeout) => warn!("gateway timed the session out"),
                    Ok(ConnectionEvent::ConnectError) => {
                        warn!("gateway is unreachable, giving up");
                        break;
                    }
                    Ok(ConnectionEvent::Generic { kind, .. }) => info!(%kind, "gateway event"),
                    Err(error) => {
                        warn!("connection event stream ended: {error}");
                        break;
                    }
                },
            }
        }
    }

    if client.is_connected().await {
        if let Err(error) = client.remove_plugin(&plugin).await {
            warn!("cannot detach streaming plugin: {error}");
        }
        client.destroy().await.ok();
    }
    Ok(())
}
