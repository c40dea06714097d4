//! `switchboard chat` — talk to the default agent from the terminal.
//!
//! Replies print directly instead of going through the delivery queue, so
//! a one-shot message works without the daemon running.

use crate::runtime;
use switchboard_config::AppConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let runtime = runtime::build(&config).await?;
    let state = runtime.state;

    let resolution = state.router.resolve("cli", "user").await;
    let soul = state.souls.load(&resolution.agent_id);

    if let Some(message) = message {
        let reply = state
            .agent
            .run(&message, &resolution.session_key, &soul)
            .await?;
        println!("{reply}");
        return Ok(());
    }

    println!("Chatting with '{}' (exit to quit)", resolution.agent_id);
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        match state.agent.run(line, &resolution.session_key, &soul).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}
