//! Chat server demo
//!
//! Run with: cargo run --example chat_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example chat_server                    # binds to 0.0.0.0:8888
//!   cargo run --example chat_server localhost          # binds to 127.0.0.1:8888
//!   cargo run --example chat_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! Then connect one or more terminal clients:
//!   cargo run --example chat_client 127.0.0.1:8888

use std::net::SocketAddr;
use std::time::Duration;

use chatroom_rs::activity::MemoryBackend;
use chatroom_rs::{ChatServer, ServerConfig};

const DEFAULT_PORT: u16 = 8888;

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8888
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8888
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: chat_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8888)");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  chat_server                     # binds to 0.0.0.0:8888");
    eprintln!("  chat_server localhost           # binds to 127.0.0.1:8888");
    eprintln!("  chat_server 127.0.0.1:9000      # binds to 127.0.0.1:9000");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();
    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chatroom_rs=info".parse()?)
                .add_directive("chat_server=info".parse()?),
        )
        .init();

    println!("Starting chat server on {}", config.bind_addr);
    println!("Idle clients are dropped after {:?}", config.idle_timeout);
    println!();

    let server = ChatServer::new(config, MemoryBackend::new());

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    let stats = server.stats();
    println!(
        "Stats: accepted={} sessions={} messages={} deliveries={} failed={} dropped={} uptime={:?}",
        stats.connections_accepted,
        stats.sessions_opened,
        stats.messages_received,
        stats.deliveries,
        stats.delivery_failures,
        stats.broadcasts_dropped,
        Duration::from_secs(stats.uptime.as_secs()),
    );

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
