//! `calagent chat` — interactive REPL over the natural-language
//! dispatcher.
//!
//! Each line goes through the LM-mediated tool dispatch; the result is
//! printed to stdout.  Slash commands cover the handful of local
//! conveniences.

use ca_tools::NlDispatcher;

/// Run the interactive REPL.
pub async fn run(dispatcher: NlDispatcher, partner: Option<String>) -> anyhow::Result<()> {
    let history_path = dirs_home().join(".calagent").join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("calagent interactive chat");
    eprintln!("Type a request in plain language, /help for commands, Ctrl+D to exit");
    eprintln!();

    let mut partner = partner;

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if let Some(rest) = trimmed.strip_prefix('/') {
                    match handle_slash_command(rest, &mut partner) {
                        SlashResult::Handled => continue,
                        SlashResult::Quit => break,
                    }
                }

                let reply = dispatcher.dispatch_text(trimmed, partner.as_deref()).await;
                println!("{reply}");
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

enum SlashResult {
    Handled,
    Quit,
}

fn handle_slash_command(command: &str, partner: &mut Option<String>) -> SlashResult {
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("quit") | Some("exit") => SlashResult::Quit,
        Some("partner") => {
            match parts.next() {
                Some(id) => {
                    *partner = Some(id.to_string());
                    eprintln!("partner set to {id}");
                }
                None => match partner {
                    Some(id) => eprintln!("partner: {id}"),
                    None => eprintln!("no partner set; /partner <agent-id>"),
                },
            }
            SlashResult::Handled
        }
        _ => {
            eprintln!("/partner [agent-id]  show or set the default booking partner");
            eprintln!("/quit                exit");
            SlashResult::Handled
        }
    }
}

fn dirs_home() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
