mod session;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use jaxnet::{ConnectionEndpoint, DEFAULT_CONTROL_PORT, NetConfig};

#[derive(Parser)]
#[command(name = "jaxnet-client")]
#[command(about = "JaxNet test client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: IpAddr,

    #[arg(short, long, default_value_t = DEFAULT_CONTROL_PORT)]
    port: u16,

    #[arg(short, long, help = "Local datagram port (0 picks any)")]
    data_port: Option<u16>,

    #[arg(short, long)]
    username: String,

    #[arg(short, long, help = "TOML file with network settings")]
    config: Option<PathBuf>,

    #[arg(long, help = "Join without marking ready")]
    no_ready: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            NetConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => NetConfig::default(),
    };
    let data_port = args.data_port.unwrap_or(config.client_data_port);
    let tick = config.tick_duration();

    let mut endpoint = ConnectionEndpoint::new(config);
    endpoint
        .bind_data_channel(data_port)
        .await
        .context("binding data port")?;
    let server_port = endpoint
        .connect(args.server, args.port)
        .await
        .context("connecting")?;
    log::info!("Connected; server datagrams on port {}", server_port);

    endpoint.join(&args.username).await?;
    if !args.no_ready {
        endpoint.set_ready(true).await?;
    }

    tokio::select! {
        started = session::wait_for_start(&mut endpoint) => started?,
        _ = tokio::signal::ctrl_c() => {
            endpoint.disconnect().await?;
            return Ok(());
        }
    }
    log::info!("Game started");

    let receiver = session::spawn_receiver(endpoint.data_channel()?);

    tokio::select! {
        sent = session::send_ticks(&mut endpoint, tick) => {
            if let Err(e) = sent {
                log::warn!("Stopped sending: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
    }

    endpoint.disconnect().await?;
    let received = receiver.await?;
    log::info!("Received {} state updates", received);

    Ok(())
}
