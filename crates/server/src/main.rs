mod config;
mod events;
mod server;
mod simulation;
mod tui;

use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::runtime::Runtime;

use jaxnet::NetConfig;

use config::ServerConfig;
use server::GameServer;
use tui::TuiState;

#[derive(Parser)]
#[command(name = "jaxnet-server")]
#[command(about = "JaxNet session hub")]
struct Args {
    #[arg(short, long, help = "TOML file with network settings")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<IpAddr>,

    #[arg(long)]
    control_port: Option<u16>,

    #[arg(long)]
    data_port: Option<u16>,

    #[arg(long)]
    packet_length: Option<usize>,

    #[arg(long, help = "Players per lobby")]
    capacity: Option<usize>,

    #[arg(short, long)]
    max_peers: Option<usize>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(long, help = "Only start once every lobby seat is taken")]
    require_full: bool,

    #[arg(long)]
    headless: bool,
}

impl Args {
    fn net_config(&self) -> Result<NetConfig> {
        let mut net = match &self.config {
            Some(path) => NetConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NetConfig::default(),
        };

        if let Some(bind) = self.bind {
            net.bind_address = bind;
        }
        if let Some(port) = self.control_port {
            net.control_port = port;
        }
        if let Some(port) = self.data_port {
            net.data_port = port;
        }
        if let Some(length) = self.packet_length {
            net.packet_length = length;
        }
        if let Some(capacity) = self.capacity {
            net.lobby_capacity = capacity;
        }
        if let Some(max_peers) = self.max_peers {
            net.max_peers = max_peers;
        }
        if let Some(tick_rate) = self.tick_rate {
            net.tick_rate = tick_rate;
        }
        if self.require_full {
            net.require_full = true;
        }

        net.validate()?;
        Ok(net)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig {
        net: args.net_config()?,
        ..Default::default()
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let runtime = Runtime::new()?;
    let mut server = runtime
        .block_on(GameServer::start(config))
        .context("starting server")?;

    if args.headless {
        log::info!(
            "Server started: control {:?}, data {:?}",
            server.local_control_addr(),
            server.local_data_addr()
        );
        runtime.block_on(server.run());
    } else {
        run_with_tui(&runtime, &mut server)?;
    }

    Ok(())
}

fn run_with_tui(runtime: &Runtime, server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    if let (Some(control), Some(data)) = (server.local_control_addr(), server.local_data_addr()) {
        tui_state.log_info(format!("Control on {}, datagrams on {}", control, data));
    }

    while running.load(Ordering::SeqCst) {
        runtime.block_on(server.tick());

        for event in server.drain_events() {
            if event.is_warning() {
                tui_state.log_warn(event.describe());
            } else {
                tui_state.log_info(event.describe());
            }
        }

        if event::poll(server.tick_duration())? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    running.store(false, Ordering::SeqCst);
                }
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats);
        })?;
    }

    tui_state.log_info("Shutting down...");
    runtime.block_on(server.shutdown());

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
