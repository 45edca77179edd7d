//! `hintloop run`: Single-message or interactive mode.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use hintloop_agent::{AgentLoop, AgentStreamEvent, RunOutcome};
use hintloop_config::AppConfig;
use hintloop_core::error::ProviderError;
use hintloop_core::message::Conversation;
use hintloop_core::state::SharedState;
use hintloop_core::trigger::{EventType, InboundEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub async fn run(message: Option<String>, event_type: EventType) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let provider = match hintloop_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            print_key_help(&config);
            return Err(e.into());
        }
    };

    let toolset = hintloop_tools::build_toolset(&config).await?;
    let tool_names: Vec<String> = toolset
        .registry
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();
    tracing::debug!(tools = ?tool_names, mcp_tools = toolset.mcp_tools.len(), "Toolset ready");
    let agent = AgentLoop::from_config(
        &config,
        provider,
        Arc::new(toolset.registry),
        SharedState::default(),
    );
    let cwd = agent.state().lock().await.current_dir.clone();
    let mut conversation =
        Conversation::with_system_prompt(hintloop_agent::system_prompt(&config, &cwd).await);

    if let Some(msg) = message {
        let input = InboundEvent::new(event_type, msg).to_user_message();
        let outcome = run_once(&agent, &mut conversation, &input).await?;
        if !outcome.success {
            std::process::exit(2);
        }
        return Ok(());
    }

    println!();
    println!("  hintloop: interactive mode");
    println!();
    println!("  Provider:  {}", agent.provider_name());
    println!("  Model:     {}", agent.model());
    println!("  Tools:     {}", tool_names.join(", "));
    if let Some(path) = agent.trajectory().path() {
        println!("  Trajectory: {}", path.display());
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  'reset' clears the session, 'exit' or Ctrl+D quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" => break,
            "reset" => {
                conversation.clear_history();
                agent.state().reset().await;
                println!("  Session reset.");
            }
            _ => {
                let input = InboundEvent::new(event_type, line).to_user_message();
                if let Err(e) = run_once(&agent, &mut conversation, &input).await {
                    eprintln!("  [Error] {e}");
                }
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_key_help(config: &AppConfig) {
    eprintln!();
    eprintln!("  ERROR: No API key configured for provider '{}'!", config.provider);
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    HINTLOOP_API_KEY     (generic)");
    eprintln!("    OPENROUTER_API_KEY   (openrouter)");
    eprintln!("    OPENAI_API_KEY       (openai)");
    eprintln!("    ANTHROPIC_API_KEY    (anthropic)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_path().display());
    eprintln!();
}

/// Run one input, printing progress as it arrives.
async fn run_once(
    agent: &AgentLoop,
    conversation: &mut Conversation,
    input: &str,
) -> Result<RunOutcome, ProviderError> {
    let (tx, mut rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        let mut mid_line = false;
        while let Some(event) = rx.recv().await {
            if let AgentStreamEvent::Chunk { content } = &event {
                print!("{content}");
                let _ = std::io::stdout().flush();
                mid_line = !content.ends_with('\n');
                continue;
            }
            if let Some(text) = describe(&event) {
                if mid_line {
                    println!();
                    mid_line = false;
                }
                println!("{text}");
            }
        }
    });

    let result = agent.run_observed(conversation, input, Some(tx)).await;
    let _ = printer.await;
    result
}

/// One terminal line (or block) per non-text event.
fn describe(event: &AgentStreamEvent) -> Option<String> {
    match event {
        AgentStreamEvent::IterationStart {
            iteration,
            max_iterations,
        } => Some(format!("  · iteration {iteration}/{max_iterations}")),
        AgentStreamEvent::Chunk { .. } | AgentStreamEvent::IterationEnd { .. } => None,
        AgentStreamEvent::ToolCall {
            name,
            arguments,
            call_number,
            ..
        } => Some(format!(
            "  → {name} #{call_number} {}",
            truncate(&arguments.to_string(), 120)
        )),
        AgentStreamEvent::ToolResult {
            name,
            success,
            duration_ms,
            ..
        } => Some(format!(
            "  {} {name} ({duration_ms} ms)",
            if *success { "✓" } else { "✗" }
        )),
        AgentStreamEvent::MaxIterationsReached { iterations, .. } => Some(format!(
            "  [max iterations reached after {iterations}]"
        )),
        AgentStreamEvent::Done {
            final_answer,
            iterations,
            tool_calls_count,
            ..
        } => Some(format!(
            "\n  Answer > {final_answer}\n  ({iterations} iterations, {tool_calls_count} tool calls)\n"
        )),
        AgentStreamEvent::Error { message } => Some(format!("  [Error] {message}")),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_line() {
        let line = describe(&AgentStreamEvent::ToolCall {
            id: "c1".into(),
            name: "execute_command".into(),
            arguments: serde_json::json!({"command": "ls"}),
            call_number: 3,
        })
        .unwrap();
        assert_eq!(line, r#"  → execute_command #3 {"command":"ls"}"#);
    }

    #[test]
    fn failed_tool_result_line() {
        let line = describe(&AgentStreamEvent::ToolResult {
            id: "c1".into(),
            name: "read_file".into(),
            success: false,
            content: "{}".into(),
            duration_ms: 4,
        })
        .unwrap();
        assert_eq!(line, "  ✗ read_file (4 ms)");
    }

    #[test]
    fn silent_events() {
        assert!(describe(&AgentStreamEvent::IterationEnd { iteration: 1 }).is_none());
        assert!(describe(&AgentStreamEvent::Chunk { content: "x".into() }).is_none());
    }

    #[test]
    fn done_block() {
        let text = describe(&AgentStreamEvent::Done {
            final_answer: "two files".into(),
            success: true,
            iterations: 2,
            tool_calls_count: 1,
        })
        .unwrap();
        assert!(text.contains("Answer > two files"));
        assert!(text.contains("(2 iterations, 1 tool calls)"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé…");
    }
}
