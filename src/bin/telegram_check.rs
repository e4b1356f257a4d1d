//! telegram_check - verify Telegram notifier credentials
//!
//! Probes the bot with getMe, then sends a test message and a sample alert to the
//! configured chat. Exits non-zero when any step fails.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use skywatch::notify::DEFAULT_API_BASE;
use skywatch::{ClassCatalog, Notifier, TelegramConfig, TelegramNotifier};

#[allow(dead_code)]
#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bot token issued by BotFather.
    #[arg(long, env = "SKYWATCH_TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,
    /// Destination chat id.
    #[arg(long, env = "SKYWATCH_TELEGRAM_CHAT_ID")]
    chat_id: String,
    /// Bot API base URL.
    #[arg(long, env = "SKYWATCH_TELEGRAM_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,
    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// Class used for the sample alert.
    #[arg(long, default_value = "Drone")]
    trigger_class: String,
    /// Only run the connection probe.
    #[arg(long)]
    skip_send: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());
    if args.timeout_secs == 0 {
        return Err(anyhow!("--timeout-secs must be greater than zero"));
    }

    let config = TelegramConfig::new(args.bot_token.trim(), args.chat_id.trim())
        .with_api_base(args.api_base.trim())
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let notifier = TelegramNotifier::new(config, Arc::new(ClassCatalog::aerial()));

    let check = {
        let _stage = ui.stage("Checking bot");
        notifier.test_connection()
    };
    if !check.ok {
        return Err(anyhow!("connection check failed: {}", check.message));
    }
    println!("{}", check.message);
    if args.skip_send {
        return Ok(());
    }

    let sent = {
        let _stage = ui.stage("Sending test message");
        notifier.send_test()
    };
    if !sent {
        return Err(anyhow!("test message was not accepted"));
    }

    let sent = {
        let _stage = ui.stage("Sending sample alert");
        notifier.send_alert(&args.trigger_class, 3)
    };
    if !sent {
        return Err(anyhow!("sample alert was not accepted"));
    }
    println!("test message and sample alert delivered to chat {}", args.chat_id.trim());
    Ok(())
}
