//! Discovers the operator's Telegram chat id.
//!
//! Send any message to the bot first, then run this tool; it reads the
//! pending updates and prints the chat id to put in TELEGRAM_CHAT_ID.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<Message>,
    edited_message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    first_name: Option<String>,
    username: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let bot_token =
        env::var("TELEGRAM_BOT_TOKEN").map_err(|_| anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;

    println!("Looking for messages sent to your bot...\n");

    let url = format!("https://api.telegram.org/bot{}/getUpdates", bot_token);
    let envelope: Envelope = reqwest::get(&url).await?.json().await?;

    if !envelope.ok {
        return Err(anyhow!("Telegram API returned ok=false"));
    }
    if envelope.result.is_empty() {
        println!("No messages found yet.");
        println!("Open Telegram, find your bot, tap START or send it any message,");
        println!("then run this tool again.");
        return Ok(());
    }

    for update in envelope.result {
        let Some(message) = update.message.or(update.edited_message) else {
            continue;
        };
        println!("Found a chat:");
        println!("  Name    : {}", message.chat.first_name.unwrap_or_default());
        println!("  Username: @{}", message.chat.username.unwrap_or_default());
        println!("  Chat ID : {}", message.chat.id);
        println!("\nSet TELEGRAM_CHAT_ID={} in your environment.", message.chat.id);
        return Ok(());
    }

    Err(anyhow!("could not extract a chat id from the updates"))
}
