//! Tessera Run - hosts the VM behind a TCP byte link
//!
//! Listens for one IDE connection at a time and runs the dispatcher tick
//! loop against it; the socket plays the role of the serial port. The VM
//! state survives reconnects, the way a board survives unplugging the cable.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera_runtime::{HostPort, Runtime};

#[derive(Parser, Debug)]
#[command(name = "tessera-run")]
#[command(about = "Run the Tessera VM behind a TCP byte link")]
struct Cli {
    /// Address to listen on for the IDE connection
    #[arg(long, default_value = "127.0.0.1:9990")]
    listen: String,

    /// Board name reported in the version message
    #[arg(long, default_value = "tessera-sim")]
    board: String,
}

/// TCP rendition of the board's serial port
struct TcpPort {
    stream: TcpStream,
    board: String,
    started: Instant,
    disconnected: bool,
    reset_requested: bool,
}

impl TcpPort {
    fn new(stream: TcpStream, board: String) -> Self {
        TcpPort {
            stream,
            board,
            started: Instant::now(),
            disconnected: false,
            reset_requested: false,
        }
    }
}

impl HostPort for TcpPort {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        match self.stream.read(buf) {
            Ok(0) => {
                self.disconnected = true;
                0
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => 0,
            Err(_) => {
                self.disconnected = true;
                0
            }
        }
    }

    fn send_byte(&mut self, byte: u8) -> bool {
        match self.stream.write(&[byte]) {
            Ok(1) => true,
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => {
                self.disconnected = true;
                false
            }
        }
    }

    fn microsecs(&mut self) -> u32 {
        self.started.elapsed().as_micros() as u32
    }

    fn system_reset(&mut self) {
        self.reset_requested = true;
    }

    fn board_type(&self) -> &str {
        &self.board
    }
}

/// Reboot: keep the persisted store, rebuild everything else from it
fn reset_runtime(runtime: Runtime) -> Runtime {
    let mut fresh = Runtime::with_log(runtime.into_log());
    fresh.restore();
    fresh.start_all();
    fresh
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_run=info,tessera_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let listener = match TcpListener::bind(&cli.listen) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", cli.listen, e);
            std::process::exit(1);
        }
    };

    let mut runtime = Runtime::new();
    runtime.restore();
    runtime.start_all();

    info!("Board '{}' up, waiting for IDE on {}", cli.board, cli.listen);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("could not make the connection non-blocking: {}", e);
            continue;
        }
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(%peer, "IDE connected");

        let mut port = TcpPort::new(stream, cli.board.clone());
        while !port.disconnected {
            runtime.tick(&mut port);
            if port.reset_requested {
                info!("system reset requested by IDE");
                runtime = reset_runtime(runtime);
                port.reset_requested = false;
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        info!(%peer, "IDE disconnected");
    }
}
