//! Talk to the full desk workflow from a terminal.
//!
//! Requires `OPENAI_API_KEY`; `DATABASE_URL` defaults to a local file. Upstream
//! billing tools are enabled when `UPSTREAM_API_URL` is set.
//!
//! Run with: cargo run -p orchestrator --example console_bot

use std::io::Write;

use orchestrator::{InboundMessage, Orchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let orchestrator = Orchestrator::from_env().await?;
    let _sweeper = orchestrator.start_sweeper();

    let conversation_id =
        std::env::var("CONSOLE_CONVERSATION_ID").unwrap_or_else(|_| "console".to_string());
    info!(conversation_id = %conversation_id, "Console bot ready, Ctrl-D to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let output = orchestrator
            .run_workflow(InboundMessage::text(&conversation_id, line).with_channel("console"))
            .await;

        if let Some(intent) = &output.classification {
            println!("[{}] tools: {:?}", intent, output.tools_invoked);
        }
        if let Some(folio) = &output.ticket_folio {
            println!("[folio {}]", folio);
        }
        println!("bot> {}", output.text);
    }

    Ok(())
}
