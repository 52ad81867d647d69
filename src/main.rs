//! emberkv server binary.
//!
//! Parses the listen address from the command line, wires up the
//! keyspace, sweeper and shutdown signal, and runs the accept loop until
//! a termination signal or a client's `SHUTDOWN` command stops it.

use emberkv::commands::CommandHandler;
use emberkv::connection::{handle_connection, ConnectionStats};
use emberkv::keyspace::{start_sweeper, Keyspace, SweeperConfig};
use emberkv::shutdown::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: emberkv::DEFAULT_HOST.to_string(),
            port: emberkv::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("emberkv version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
emberkv - An In-Memory Key-Value Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 31337)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    emberkv                        # Start on 127.0.0.1:31337
    emberkv --port 6400            # Start on port 6400
    emberkv --host 0.0.0.0         # Listen on all interfaces
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let keyspace = Arc::new(Keyspace::new());
    let shutdown = Arc::new(Shutdown::new());
    let stats = Arc::new(ConnectionStats::new());

    let sweeper = start_sweeper(
        Arc::clone(&keyspace),
        SweeperConfig::default(),
        shutdown.subscribe(),
    );

    // Bind failure propagates and exits the process with a non-zero code.
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(version = emberkv::VERSION, addr = %config.bind_address(), "emberkv listening");

    spawn_signal_watcher(Arc::clone(&shutdown));

    accept_loop(listener, keyspace, Arc::clone(&stats), Arc::clone(&shutdown)).await;

    // Give live sessions a moment to flush their last replies.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while stats.live_sessions() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let _ = sweeper.await;

    info!("server shutdown complete");
    Ok(())
}

/// Maps OS termination signals onto the shared shutdown signal, so an
/// interrupt behaves exactly like the `SHUTDOWN` command.
fn spawn_signal_watcher(shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        let interrupt = signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = interrupt => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = interrupt.await;
        }

        info!("termination signal received, shutting down");
        shutdown.trigger();
    });
}

/// Accepts connections until the shutdown signal fires.
async fn accept_loop(
    listener: TcpListener,
    keyspace: Arc<Keyspace>,
    stats: Arc<ConnectionStats>,
    shutdown: Arc<Shutdown>,
) {
    let mut signal = shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let commands = CommandHandler::new(Arc::clone(&keyspace));
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        commands,
                        Arc::clone(&shutdown),
                        Arc::clone(&stats),
                    ));
                }
                Err(e) => error!(error = %e, "failed to accept connection"),
            },
            _ = signal.wait_for(|stop| *stop) => {
                info!("listener closing");
                return;
            }
        }
    }
}
