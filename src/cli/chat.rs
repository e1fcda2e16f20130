use std::io;
use std::path::Path;

use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ai::chat::{
    ChatOrchestrator, EventOutcome, QUOTA_NOTE, QUOTA_POLICY_URL, Role, SessionState, TIPS,
    UiEvent,
};
use crate::ai::render::{NullRenderer, TerminalRenderer};

#[derive(Debug, PartialEq)]
enum Input {
    Prompt(String),
    ListModels,
    SelectModel(String),
    Clear,
    History,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Prompt(line.to_string());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("models", _) => Input::ListModels,
        ("model", "") => Input::ListModels,
        ("model", arg) => Input::SelectModel(arg.to_string()),
        ("clear", _) => Input::Clear,
        ("history", _) => Input::History,
        ("help", _) => Input::Help,
        ("quit" | "exit", _) => Input::Quit,
        _ => Input::Unknown(name.to_string()),
    }
}

fn print_models(orchestrator: &ChatOrchestrator, state: &SessionState) {
    for (i, entry) in orchestrator.catalog().entries().iter().enumerate() {
        let marker = if entry.model_id == state.selected_model_id() {
            "*"
        } else {
            " "
        };
        println!("{} {}. {} ({})", marker, i + 1, entry.display_name, entry.model_id);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /models           List available models");
    println!("  /model <choice>   Switch model by number, id or name");
    println!("  /clear            Clear the chat history");
    println!("  /history          Show the chat history");
    println!("  /quit             Exit");
    println!();
    println!("Tips:");
    for tip in TIPS {
        println!("  - {}", tip);
    }
    println!();
    println!("Quota: {}. See {}", QUOTA_NOTE, QUOTA_POLICY_URL);
}

fn print_history(state: &SessionState) {
    if state.messages().is_empty() {
        println!("No messages yet");
        return;
    }
    for msg in state.messages() {
        let speaker = match msg.role {
            Role::User => "You",
            Role::Assistant => "Gemini",
        };
        println!("[{}] {}: {}", msg.created_at.format("%H:%M:%S"), speaker, msg.content);
    }
}

pub async fn run(secrets_path: &Path, model: Option<String>) -> Result<()> {
    let orchestrator = super::bootstrap(secrets_path).await?;

    let mut state = match model {
        Some(query) => {
            let entry = orchestrator
                .catalog()
                .find(&query)
                .ok_or_else(|| anyhow!("Model {} is not available", query))?;
            orchestrator.new_session_with_model(&entry.model_id)?
        }
        None => orchestrator.new_session(),
    };

    println!("🤖 Gemini Chat. Type /help for commands.");
    print_models(&orchestrator, &state);

    let mut rl = DefaultEditor::new()?;
    loop {
        let readline = rl.readline(">>> ");
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                tracing::error!("Reading input failed: {:?}", err);
                break;
            }
        };
        if let Err(e) = rl.add_history_entry(line.as_str()) {
            tracing::debug!("Could not add to input history: {}", e);
        }

        let event = match parse_input(&line) {
            Input::Prompt(prompt) => UiEvent::Submit(prompt),
            Input::SelectModel(query) => match orchestrator.catalog().find(&query) {
                Some(entry) => UiEvent::SelectModel(entry.model_id.clone()),
                None => {
                    println!("Unknown model {}. Use /models to see the options.", query);
                    continue;
                }
            },
            Input::Clear => UiEvent::ClearHistory,
            Input::ListModels => {
                print_models(&orchestrator, &state);
                continue;
            }
            Input::History => {
                print_history(&state);
                continue;
            }
            Input::Help => {
                print_help();
                continue;
            }
            Input::Unknown(name) => {
                println!("Unknown command /{}. Type /help for commands.", name);
                continue;
            }
            Input::Empty => continue,
            Input::Quit => break,
        };

        let result = if matches!(event, UiEvent::Submit(_)) {
            let mut renderer = TerminalRenderer::new(io::stdout());
            orchestrator.handle(&mut state, event, &mut renderer).await
        } else {
            orchestrator.handle(&mut state, event, &mut NullRenderer).await
        };

        match result {
            Ok(EventOutcome::ModelSelected {
                model_id,
                context_reset,
            }) => {
                println!("Switched to {}", model_id);
                if context_reset {
                    println!("The next message starts a new conversation");
                }
            }
            Ok(EventOutcome::HistoryCleared) => println!("Chat history cleared"),
            Ok(EventOutcome::Replied(_)) => {}
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}
