//! Simple chat hub example
//!
//! Run with: cargo run --example simple_hub [BIND_ADDR] [DB_PATH]
//!
//! Examples:
//!   cargo run --example simple_hub                        # 0.0.0.0:3001, in-memory store
//!   cargo run --example simple_hub localhost              # 127.0.0.1:3001
//!   cargo run --example simple_hub 127.0.0.1:3002         # custom port
//!   cargo run --example simple_hub 0.0.0.0:3001 chat.db   # durable store
//!
//! Connect with the chat_client example, or by hand:
//!   nc localhost 3001
//!   {"userId":"u1","userName":"alice","content":"hi","type":"text","timestamp":1}
//!   {"type":"history","limit":10}

use std::net::SocketAddr;

use chathub::{ChatHub, HubConfig, MessageStore};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:3001
/// - "localhost:3002" -> 127.0.0.1:3002
/// - "127.0.0.1" -> 127.0.0.1:3001
/// - "0.0.0.0:3001" -> 0.0.0.0:3001
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 3001;

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
    eprintln!("Usage: simple_hub [BIND_ADDR] [DB_PATH]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:3001)");
    eprintln!("  DB_PATH      SQLite database path (default: in-memory)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:3001".parse().unwrap(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chathub=debug".parse()?)
                .add_directive("simple_hub=debug".parse()?),
        )
        .init();

    let store = match args.get(2) {
        Some(path) => {
            println!("Using database at {}", path);
            MessageStore::open(path)?
        }
        None => {
            println!("Using in-memory store (messages lost on exit)");
            MessageStore::in_memory()?
        }
    };

    let config = HubConfig::default().bind(bind_addr);
    let hub = ChatHub::new(config, store);

    println!("Starting chat hub on {}", bind_addr);
    println!();
    println!("Connect with: cargo run --example chat_client {}", bind_addr);
    println!();

    hub.run_until(async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    })
    .await?;

    Ok(())
}
