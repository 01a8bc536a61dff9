//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde_json::{json, Value};
use vndb_client::{Client, Outcome};
use vndb_protocol::reply::split_status;
use vndb_protocol::{Command, Results, StatusWord};

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Dbstats => {
            let stats = client.dbstats().await?;
            let mut output = format!("{}", "Database statistics".bold());
            for (kind, count) in &stats {
                output.push_str(&format!("\n  {:<12} {}", kind.cyan(), count));
            }
            Ok(output)
        }

        Commands::Get {
            kind,
            flags,
            filters,
            options,
        } => {
            // Raw arguments go through the command builder so that bad input
            // is reported the same way as from library callers.
            let mut args = json!({
                "type": kind,
                "flags": flags,
                "filters": filters,
            });
            if let Some(options) = options {
                args["options"] = parse_json_arg(&options)?;
            }

            match client.connection().issue(Command::Get(Some(args))).await? {
                Outcome::Results(results) => Ok(format_results(&results)),
                other => Ok(format_json(&other.into_value())),
            }
        }

        Commands::Set { kind, id, fields } => {
            let fields = match fields {
                Some(fields) => parse_json_arg(&fields)?,
                None => json!({}),
            };
            let args = json!({
                "type": kind,
                "id": id,
                "fields": fields,
            });

            client.connection().issue(Command::Set(Some(args))).await?;
            Ok(format!("{} {} {}", "Updated".green(), kind, id.to_string().cyan()))
        }

        Commands::Raw { message } => {
            let reply = client.write(&message).await?;
            Ok(format_reply(&reply))
        }
    }
}

/// Formats one page of `get` results.
pub fn format_results(results: &Results) -> String {
    let mut output = format!(
        "{} {}",
        results.num.to_string().bold(),
        if results.num == 1 { "item" } else { "items" }
    );
    if results.more {
        output.push_str(&format!(" {}", "(more available)".dimmed()));
    }
    for item in &results.items {
        output.push('\n');
        output.push_str(&format_json(item));
    }
    output
}

/// Formats a raw reply line: coloured status word, pretty-printed body.
pub fn format_reply(line: &str) -> String {
    let (word, body) = split_status(line);
    let status = match StatusWord::from_word(word) {
        Some(StatusWord::Error) => word.red().bold(),
        Some(_) => word.green(),
        None => word.yellow(),
    };

    if body.is_empty() {
        return status.to_string();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => format!("{} {}", status, format_json(&value)),
        Err(_) => format!("{} {}", status, body),
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_format_reply() {
        plain();
        assert_eq!(format_reply("ok"), "ok");
        assert_eq!(
            format_reply(r#"dbstats {"vn":1}"#),
            "dbstats {\n  \"vn\": 1\n}"
        );
        assert_eq!(format_reply("bogus reply"), "bogus reply");
    }

    #[test]
    fn test_format_results() {
        plain();
        let results = Results {
            num: 1,
            more: true,
            items: vec![json!({"id": 17})],
        };
        assert_eq!(
            format_results(&results),
            "1 item (more available)\n{\n  \"id\": 17\n}"
        );
    }

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg(r#"{"page":2}"#).unwrap(), json!({"page": 2}));
        assert!(parse_json_arg("{page").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"vote":88}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(parse_json_arg(&arg).unwrap(), json!({"vote": 88}));
    }
}
