//! Agent command handlers (one-shot + interactive).

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use nanoclaw::bus::{InboundMessage, MessageBus};
use nanoclaw::config::Config;
use nanoclaw::log_component;

use super::common::create_agent;

/// Interactive or single-message agent mode.
pub(crate) async fn cmd_agent(message: Option<String>, session: String) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let bus = Arc::new(MessageBus::new());
    let agent = create_agent(config, Arc::clone(&bus))?;
    let (channel, chat_id) = session.split_once(':').unwrap_or(("cli", session.as_str()));

    if let Some(msg) = message {
        let response = agent
            .process_direct(&msg, &session, channel, chat_id)
            .await
            .with_context(|| "Agent failed to process message")?;
        println!("{}", response);

        // Keep the process alive until background work has reported back.
        agent.wait_for_background().await;
        while let Ok(Some(announcement)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), bus.consume_inbound()).await
        {
            match agent.process_message(&announcement).await {
                Ok(reply) => println!("\n{}", reply),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
        agent.budget().emit_usage("exit");
        return Ok(());
    }

    log_component!(info, "cli", "Starting interactive agent", session = session.as_str());
    println!("nanoclaw interactive agent (session {})", session);
    println!("Type a message and press Enter. Type 'exit' or 'quit' to stop, '/help' for commands.");
    println!();

    let runner = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.start().await })
    };

    // Prints replies as they arrive, including background announcements.
    let printer = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            while let Some(out) = bus.consume_outbound().await {
                println!("\n{}\n", out.content);
                print!("> ");
                let _ = std::io::stdout().flush();
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print!("> ");
    std::io::stdout().flush()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            print!("> ");
            std::io::stdout().flush()?;
            continue;
        }
        if input == "exit" || input == "quit" {
            println!("Goodbye!");
            break;
        }

        let inbound = InboundMessage::new(channel, "user", chat_id, input).with_session_key(&session);
        bus.publish_inbound(inbound)
            .await
            .with_context(|| "Message bus closed")?;
    }

    agent.stop();
    let _ = runner.await;
    printer.abort();
    if agent.subagents().running_count() > 0 {
        eprintln!(
            "{} background task(s) still running; their results will not be shown.",
            agent.subagents().running_count()
        );
    }
    Ok(())
}
