//! Terminal chat client demo
//!
//! Run with: cargo run --example chat_client [SERVER_ADDR] [NAME]
//!
//! Examples:
//!   cargo run --example chat_client                        # 127.0.0.1:8888, asks for a name
//!   cargo run --example chat_client 127.0.0.1:9000 alice
//!
//! Commands: /help /rank /stats /clear /quit

use chatroom_rs::activity::format_clock;
use chatroom_rs::client::{ChatClient, ClientConfig, ClientEvent};
use chatroom_rs::{Message, MessageKind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

fn print_help() {
    println!("{}Commands:", CYAN);
    println!("  /help    - show this help");
    println!("  /rank    - show the activity leaderboard");
    println!("  /stats   - show your own activity");
    println!("  /clear   - clear the screen");
    println!("  /quit    - leave the room{}", RESET);
}

fn display(msg: &Message, own_id: &str) {
    let clock = format_clock(msg.timestamp);

    match msg.kind {
        MessageKind::Normal if msg.id == own_id => {
            println!("{}[{}][you]{} {}", GREEN, clock, RESET, msg.content)
        }
        MessageKind::Normal => println!(
            "{}[{}][{}({})]{} {}",
            BLUE, clock, msg.from, msg.id, RESET, msg.content
        ),
        MessageKind::System => println!("{}[{}][system] {}{}", YELLOW, clock, msg.content, RESET),
        MessageKind::Join => println!(
            "{}[{}][system] {} <{}> joined{}",
            YELLOW, clock, msg.from, msg.id, RESET
        ),
        MessageKind::Leave => println!(
            "{}[{}][system] {} <{}> left{}",
            YELLOW, clock, msg.from, msg.id, RESET
        ),
        MessageKind::Rank => println!("\n{}{}{}", CYAN, msg.content, RESET),
        MessageKind::Heartbeat | MessageKind::Unknown(_) => {}
    }
}

async fn prompt(label: &str) -> std::io::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: chat_client [SERVER_ADDR] [NAME]");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chatroom_rs=warn".parse()?),
        )
        .init();

    let config = match args.get(1) {
        Some(addr) => ClientConfig::new(addr.replace("localhost", "127.0.0.1")),
        None => ClientConfig::default(),
    };
    let name = match args.get(2) {
        Some(name) => name.clone(),
        None => prompt("Name: ").await?,
    };

    let (mut client, mut events) = ChatClient::new(config);
    if let Err(e) = client.connect(&name).await {
        eprintln!("{}Failed to join: {}{}", RED, e, RESET);
        std::process::exit(1);
    }

    let own_id = client.id().unwrap_or_default().to_string();
    println!(
        "{}Logged in as {}({}). Type a message to chat, /help for commands.{}",
        GREEN,
        client.name().unwrap_or_default(),
        own_id,
        RESET
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Message(msg)) => display(&msg, &own_id),
                Some(ClientEvent::Connected { .. }) => {}
                Some(ClientEvent::Disconnected(reason)) => {
                    println!("{}Disconnected: {}{}", RED, reason, RESET);
                    break;
                }
                None => break,
            },
            line = lines.next_line() => {
                let text = match line? {
                    Some(line) => line.trim().to_string(),
                    None => break,
                };

                let result = match text.as_str() {
                    "" => Ok(()),
                    "/quit" => break,
                    "/help" => {
                        print_help();
                        Ok(())
                    }
                    "/clear" => {
                        print!("\x1b[H\x1b[2J");
                        Ok(())
                    }
                    "/stats" => {
                        let stats = client.stats();
                        let last = stats
                            .last_activity
                            .map(format_clock)
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "{}Messages sent: {}  Last active: {}{}",
                            CYAN, stats.score, last, RESET
                        );
                        Ok(())
                    }
                    "/rank" => client.request_rank().await,
                    _ => client.send_text(&text).await,
                };

                if let Err(e) = result {
                    println!("{}Send failed: {}{}", RED, e, RESET);
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
