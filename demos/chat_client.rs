//! Interactive chat client example
//!
//! Run with: cargo run --example chat_client [ADDR] [NAME]
//!
//! Examples:
//!   cargo run --example chat_client                       # 127.0.0.1:3001, name "guest"
//!   cargo run --example chat_client 127.0.0.1:3002 alice
//!
//! Lines typed on stdin are sent as text messages. The last few messages
//! are printed on connect, and the session reconnects automatically if the
//! hub goes away.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, BufReader};

use chathub::{ClientSession, HistoryPager, Message, MessageKind, SessionConfig, SessionEvent};

const HISTORY_PAGE: usize = 10;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn print_message(msg: &Message) {
    match msg.kind {
        MessageKind::System => {
            println!("* {}", msg.content.as_deref().unwrap_or(""));
        }
        MessageKind::Text => {
            println!(
                "<{}> {}",
                msg.sender_name,
                msg.content.as_deref().unwrap_or("")
            );
        }
        MessageKind::Audio | MessageKind::Video => {
            if let Some(att) = &msg.attachment {
                println!(
                    "<{}> [{} {} ({} bytes)] {}",
                    msg.sender_name, msg.kind, att.name, att.size_bytes, att.url
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let addr = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "127.0.0.1:3001".to_string());
    let name = args.get(2).cloned().unwrap_or_else(|| "guest".to_string());
    let user_id = format!("{}-{}", name, std::process::id());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chathub=info".parse()?),
        )
        .init();

    let (session, mut events) = ClientSession::new(SessionConfig::new(addr.clone()));
    session.on_message(|msg| print_message(msg));

    println!("Connecting to {} as {}...", addr, name);
    session.connect().await?;

    // Show recent history so the conversation has context.
    let mut pager = HistoryPager::new(&session, HISTORY_PAGE);
    let recent = pager.load_older().await?;
    if !recent.is_empty() {
        println!("--- last {} messages ---", recent.len());
        for msg in &recent {
            print_message(msg);
        }
        println!("--- end of history ---");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(SessionEvent::Connected) => println!("* connected"),
                    Some(SessionEvent::Disconnected) => println!("* disconnected"),
                    Some(SessionEvent::Reconnecting { attempt, delay }) => {
                        println!("* reconnecting (attempt {}, in {:?})", attempt, delay);
                    }
                    Some(SessionEvent::ReconnectExhausted { attempts }) => {
                        eprintln!("Gave up after {} reconnect attempts", attempts);
                        break;
                    }
                    Some(SessionEvent::Error(content)) => eprintln!("Hub error: {}", content),
                    None => break,
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "/quit" {
                    break;
                }
                let msg = Message::text(&user_id, &name, text, now_millis());
                if let Err(e) = session.send(msg).await {
                    eprintln!("Send failed: {}", e);
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}
