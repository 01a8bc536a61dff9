//! Reply parsing and classification.
//!
//! Every reply is `<status-word>[ <json-body>]`. The parsers return
//! `Ok(None)` when the status word is not the one they handle, so the caller
//! can check for `error` first and then try the parser of the command it sent.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Leading token of an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusWord {
    Ok,
    DbStats,
    Results,
    Error,
}

impl StatusWord {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusWord::Ok => "ok",
            StatusWord::DbStats => "dbstats",
            StatusWord::Results => "results",
            StatusWord::Error => "error",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "ok" => Some(StatusWord::Ok),
            "dbstats" => Some(StatusWord::DbStats),
            "results" => Some(StatusWord::Results),
            "error" => Some(StatusWord::Error),
            _ => None,
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits a reply line into its status word and body.
pub fn split_status(line: &str) -> (&str, &str) {
    line.split_once(' ').unwrap_or((line, ""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw acknowledgement line (`ok`).
    Ack(String),
    /// Decoded JSON body.
    Json(Value),
}

/// A reply with its classification and decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub classification: Classification,
    pub payload: Payload,
}

impl ParsedResponse {
    pub fn is_error(&self) -> bool {
        self.classification == Classification::Error
    }
}

/// Parses `line` if its status word is `expected`.
pub fn parse(expected: StatusWord, line: &str) -> Result<Option<ParsedResponse>, ProtocolError> {
    let (word, body) = split_status(line);
    if word != expected.as_str() {
        return Ok(None);
    }

    let classification = match expected {
        StatusWord::Error => Classification::Error,
        _ => Classification::Ok,
    };

    let payload = match expected {
        StatusWord::Ok => Payload::Ack(line.to_string()),
        _ => Payload::Json(serde_json::from_str(body).map_err(|_| unexpected(line))?),
    };

    Ok(Some(ParsedResponse {
        classification,
        payload,
    }))
}

fn unexpected(line: &str) -> ProtocolError {
    ProtocolError::UnexpectedResponse(line.to_string())
}

fn parse_typed<T: DeserializeOwned>(
    expected: StatusWord,
    line: &str,
) -> Result<Option<T>, ProtocolError> {
    match parse(expected, line)? {
        Some(ParsedResponse {
            payload: Payload::Json(value),
            ..
        }) => serde_json::from_value(value)
            .map(Some)
            .map_err(|_| unexpected(line)),
        _ => Ok(None),
    }
}

/// Statistics returned by `dbstats`, keyed by database type.
pub type DbStats = Map<String, Value>;

/// One page of items returned by `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results<T = Value> {
    pub num: u64,
    pub more: bool,
    pub items: Vec<T>,
}

/// Body of an `error` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error class, e.g. `parse`, `auth`, `needlogin`, `throttled`.
    pub id: String,
    #[serde(default)]
    pub msg: String,
    /// Any further fields the server attached (`field`, `type`, `minwait`...).
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msg.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.msg, self.id)
        }
    }
}

/// Parses an `ok` acknowledgement, returning the raw line.
pub fn parse_ack(line: &str) -> Result<Option<String>, ProtocolError> {
    Ok(match parse(StatusWord::Ok, line)? {
        Some(ParsedResponse {
            payload: Payload::Ack(ack),
            ..
        }) => Some(ack),
        _ => None,
    })
}

pub fn parse_dbstats(line: &str) -> Result<Option<DbStats>, ProtocolError> {
    parse_typed(StatusWord::DbStats, line)
}

pub fn parse_results<T: DeserializeOwned>(line: &str) -> Result<Option<Results<T>>, ProtocolError> {
    parse_typed(StatusWord::Results, line)
}

pub fn parse_error(line: &str) -> Result<Option<ErrorDetail>, ProtocolError> {
    parse_typed(StatusWord::Error, line)
}
