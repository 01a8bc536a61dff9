//! Interactive REPL.

use crate::commands::format_reply;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::path::PathBuf;
use vndb_client::{Client, ConnectionConfig};

const HELP_TEXT: &str = r#"
Lines are sent to the server as-is. Examples:
  dbstats
  get vn basic,anime (id = 17)
  get release basic (vn = 17) {"page":2,"results":5}
  set votelist 17 {"vote":88}

REPL commands:
  help                          Show this help
  quit, exit                    Exit the REPL
"#;

const HISTORY_FILE: &str = ".vndb_history";

pub async fn run(config: &ConnectionConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "vndb CLI".bold().cyan());
    println!("Connecting to {}...", config.addr());

    let client = Client::connect(config).await?;
    println!("{}", "Connected!".green());

    // Create readline editor
    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = history_path();
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "vndb>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match line {
                    "help" | "?" => println!("{}", HELP_TEXT),
                    "quit" | "exit" | "q" => break,
                    message => match client.write(message).await {
                        Ok(reply) => println!("{}\n", format_reply(&reply)),
                        Err(e) => {
                            println!("{}: {}\n", "Error".red(), e);
                            if client.connection().is_closed() {
                                break;
                            }
                        }
                    },
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

fn history_path() -> PathBuf {
    home::home_dir()
        .map(|home| home.join(HISTORY_FILE))
        .unwrap_or_else(|| HISTORY_FILE.into())
}
