use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use report_chat_client::auth::StaticTokenProvider;
use report_chat_client::chat::ChatMessage;
use report_chat_client::config::Settings;
use report_chat_client::connection_manager::ConnectionManager;
use report_chat_client::history::HttpHistoryClient;
use report_chat_client::metrics::encode_metrics;
use report_chat_client::telemetry::init_tracing;
use report_chat_client::view::{ChatView, ViewUpdate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&settings.logging)?;
    tracing::info!("Configuration loaded");

    let room_id = settings
        .session
        .room_id
        .clone()
        .context("No room configured, set CHAT_SESSION__ROOM_ID")?;
    let token = settings
        .session
        .token
        .clone()
        .context("No session token configured, set CHAT_SESSION__TOKEN")?;

    let manager = Arc::new(ConnectionManager::with_tungstenite(
        settings.connection_config(),
    ));
    let history = Arc::new(HttpHistoryClient::new(&settings.server.api_url)?);
    let tokens = Arc::new(StaticTokenProvider::new(token));

    let mut view = ChatView::new(manager, history, tokens, room_id)
        .with_history_limit(settings.history.limit);

    let updates = view.mount().await?;
    render(&view, &updates);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, disconnecting");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "/metrics" => println!("{}", encode_metrics()?),
                    text => {
                        view.set_input(text);
                        view.submit();
                    }
                }
            }
            updates = view.next_updates() => {
                let Some(updates) = updates else {
                    tracing::warn!("Event stream ended");
                    break;
                };
                render(&view, &updates);
            }
        }
    }

    view.unmount().await;
    tracing::info!("Chat client shutdown complete");
    Ok(())
}

fn render(view: &ChatView, updates: &[ViewUpdate]) {
    for update in updates {
        match update {
            ViewUpdate::HistoryLoaded { count } => {
                println!("-- {count} earlier messages --");
                for message in view.visible_messages() {
                    print_message(message);
                }
            }
            ViewUpdate::MessageAppended(id) => {
                if let Some(message) = view
                    .timeline()
                    .messages()
                    .iter()
                    .rev()
                    .find(|m| &m.id == id)
                    .filter(|m| !m.is_deleted())
                {
                    print_message(message);
                }
            }
            ViewUpdate::DuplicateIgnored(_) => {}
            ViewUpdate::Status(state) => println!("-- {state} --"),
            ViewUpdate::Error(message) => eprintln!("!! {message}"),
        }
    }
}

fn print_message(message: &ChatMessage) {
    let sender = message.sender_name.as_deref().unwrap_or(&message.sender_id);
    let time = message
        .created_at
        .utc()
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    println!("[{}] {}: {}", time, sender, message.content);
}
