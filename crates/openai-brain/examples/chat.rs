//! Interactive chat against the configured endpoint.
//!
//! Run with: cargo run -p openai-brain --example chat

use std::io::{self, BufRead, Write};

use openai_brain::{Brain, CompletionRequest, OpenAiBrain, TurnItem};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let brain = OpenAiBrain::from_env()?;
    println!("Model: {} (empty line to quit)", brain.config().model);

    let mut items = Vec::new();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }

        items.push(TurnItem::user(line.trim()));
        let request = CompletionRequest::new("You are a concise assistant.", items.clone());
        match brain.complete(request).await {
            Ok(completion) => {
                let text = completion.non_empty_text().unwrap_or_default().to_string();
                println!("{}", text);
                items.push(TurnItem::assistant(text));
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}
