//! Console runner for the loyalty ledger.
//!
//! Reads `<sender> <text...>` lines from standard input, handles each one as an inbound message
//! and prints the replies. Logs go to standard error.

use std::sync::Arc;

use loyalty_ledger::{
    adapters::{
        catalog::memory::MemoryCatalog, database::memory::MemoryDatabase,
        messaging::console::ConsoleMessaging, settings::memory::MemorySettings,
    },
    commands::DomainLogic,
    config::AppConfig,
    handler::{Handler, InboundMessage},
    telemetry,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    let path = std::env::args().nth(1);
    let config = AppConfig::load(path.as_deref())?;
    let timezone = config.timezone()?;

    let database = Arc::new(MemoryDatabase::new(config.tiers));
    let settings = Arc::new(MemorySettings::new(config.settings.clone()));
    let catalog = Arc::new(MemoryCatalog::new(config.rewards.clone()));
    let logic = DomainLogic::new(database, settings.clone(), catalog, timezone);
    let handler = Handler::new(
        logic,
        settings,
        Arc::new(ConsoleMessaging),
        config.business_name.clone(),
    )
    .with_welcome_text(config.welcome_text.clone());

    info!(business = %config.business_name, %timezone, "loyalty ledger ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((sender, text)) = line.split_once(char::is_whitespace) else {
            warn!(line, "expected \"<sender> <text>\"");
            continue;
        };

        let message = InboundMessage::new(sender, text, Uuid::new_v4().to_string());
        handler.handle_inbound(message).await;
    }

    Ok(())
}
