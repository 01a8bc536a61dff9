//! Commands and the command-line builder.
//!
//! A [`Command`] carries its arguments as loosely-typed JSON so that the
//! builder can report missing and malformed arguments the same way whether
//! they came from typed requests ([`LoginRequest`], [`GetQuery`],
//! [`SetRequest`]) or from user input such as the CLI.
//!
//! ```text
//! login {"protocol":1,"client":"app","clientver":"0.1"}
//! dbstats
//! get vn basic,anime (id = 17) {"page":2}
//! set votelist 17 {"vote":88}
//! ```

use crate::error::ArgumentError;
use crate::PROTOCOL_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The four command kinds understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Login,
    DbStats,
    Get,
    Set,
}

impl CommandKind {
    /// Returns the command name as written on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            CommandKind::Login => "login",
            CommandKind::DbStats => "dbstats",
            CommandKind::Get => "get",
            CommandKind::Set => "set",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Login => write!(f, "Login"),
            CommandKind::DbStats => write!(f, "DbStats"),
            CommandKind::Get => write!(f, "Get"),
            CommandKind::Set => write!(f, "Set"),
        }
    }
}

/// A command request, translated to exactly one wire line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `login <body>`; the body must be an object.
    Login(Option<Value>),
    /// `dbstats`.
    DbStats,
    /// `get <type> <flags> <filters>[ <options>]`.
    Get(Option<Value>),
    /// `set <type> <id> <fields>`.
    Set(Option<Value>),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Login(_) => CommandKind::Login,
            Command::DbStats => CommandKind::DbStats,
            Command::Get(_) => CommandKind::Get,
            Command::Set(_) => CommandKind::Set,
        }
    }

    /// Builds the wire line for this command (without the sentinel).
    pub fn to_line(&self) -> Result<String, ArgumentError> {
        match self {
            Command::Login(body) => build_login(body.as_ref()),
            Command::DbStats => Ok(build_dbstats()),
            Command::Get(args) => build_get(args.as_ref()),
            Command::Set(args) => build_set(args.as_ref()),
        }
    }
}

/// Builds `login <json-body>`.
pub fn build_login(body: Option<&Value>) -> Result<String, ArgumentError> {
    let body = present(body).ok_or(ArgumentError::MissingBody {
        command: CommandKind::Login,
    })?;
    if !body.is_object() {
        return Err(ArgumentError::NonObject {
            command: CommandKind::Login,
            field: Some("body"),
        });
    }

    Ok(format!("login {}", body))
}

/// Builds `dbstats`.
pub fn build_dbstats() -> String {
    CommandKind::DbStats.wire_name().to_string()
}

/// Builds `get <type> <flags> <filters>[ <options>]`.
pub fn build_get(args: Option<&Value>) -> Result<String, ArgumentError> {
    let args = args
        .and_then(Value::as_object)
        .ok_or(ArgumentError::NonObject {
            command: CommandKind::Get,
            field: None,
        })?;

    let kind = present(args.get("type"));
    let flags = present(args.get("flags"));
    let filters = present(args.get("filters"));
    let (kind, flags, filters) = match (kind, flags, filters) {
        (Some(kind), Some(flags), Some(filters)) => (kind, flags, filters),
        (kind, flags, filters) => {
            return Err(missing_fields(
                CommandKind::Get,
                &[
                    ("type", kind.is_none()),
                    ("flags", flags.is_none()),
                    ("filters", filters.is_none()),
                ],
            ))
        }
    };

    let options = match args.get("options") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(options @ Value::Object(_)) => Some(options),
        Some(_) => {
            return Err(ArgumentError::NonObject {
                command: CommandKind::Get,
                field: Some("options"),
            })
        }
    };

    let line = format!(
        "get {} {} {}",
        scalar_text(kind),
        normalize_flags(flags),
        normalize_filters(&scalar_text(filters))
    );

    Ok(match options {
        Some(options) => format!("{} {}", line, options),
        None => line,
    })
}

/// Builds `set <type> <id> <fields>`; empty fields leave the last token empty.
pub fn build_set(args: Option<&Value>) -> Result<String, ArgumentError> {
    let args = args
        .and_then(Value::as_object)
        .ok_or(ArgumentError::NonObject {
            command: CommandKind::Set,
            field: None,
        })?;

    let kind = present(args.get("type"));
    let id = present(args.get("id"));
    let fields = present(args.get("fields"));
    let (kind, id, fields) = match (kind, id, fields) {
        (Some(kind), Some(id), Some(fields)) => (kind, id, fields),
        (kind, id, fields) => {
            return Err(missing_fields(
                CommandKind::Set,
                &[
                    ("type", kind.is_none()),
                    ("id", id.is_none()),
                    ("fields", fields.is_none()),
                ],
            ))
        }
    };

    let fields = match fields {
        Value::Object(map) if map.is_empty() => String::new(),
        Value::Object(_) => fields.to_string(),
        _ => {
            return Err(ArgumentError::NonObject {
                command: CommandKind::Set,
                field: Some("fields"),
            })
        }
    };

    let id = numeric_id(id).ok_or(ArgumentError::NonNumeric {
        command: CommandKind::Set,
        field: "id",
    })?;

    Ok(format!("set {} {} {}", scalar_text(kind), id, fields))
}

/// Null, empty strings and empty arrays count as absent.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    })
}

fn missing_fields(command: CommandKind, checks: &[(&'static str, bool)]) -> ArgumentError {
    ArgumentError::MissingFields {
        command,
        fields: checks
            .iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| *name)
            .collect(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize_flags(flags: &Value) -> String {
    match flags {
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        other => scalar_text(other).replace(' ', ""),
    }
}

/// Wraps the filter expression in exactly one pair of parentheses.
fn normalize_filters(filters: &str) -> String {
    let inner = filters.trim_start_matches('(').trim_end_matches(')');
    format!("({})", inner)
}

/// Coerces `id` to a number; integral values are written without a fraction.
fn numeric_id(id: &Value) -> Option<String> {
    let n = match id {
        Value::Number(n) if n.is_i64() || n.is_u64() => return Some(n.to_string()),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(n.to_string());
            }
            if let Ok(n) = s.parse::<u64>() {
                return Some(n.to_string());
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        return Some((n as i64).to_string());
    }
    serde_json::Number::from_f64(n).map(|n| n.to_string())
}

// =========================================================================
// Typed requests
// =========================================================================

fn default_protocol() -> u32 {
    PROTOCOL_VERSION
}

/// Body of a `login` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default = "default_protocol")]
    pub protocol: u32,
    pub client: String,
    pub clientver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn new(client: impl Into<String>, clientver: impl Into<String>) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            client: client.into(),
            clientver: clientver.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl From<LoginRequest> for Command {
    fn from(req: LoginRequest) -> Self {
        let mut body = Map::new();
        body.insert("protocol".into(), req.protocol.into());
        body.insert("client".into(), req.client.into());
        body.insert("clientver".into(), req.clientver.into());
        if let Some(username) = req.username {
            body.insert("username".into(), username.into());
        }
        if let Some(password) = req.password {
            body.insert("password".into(), password.into());
        }
        Command::Login(Some(Value::Object(body)))
    }
}

/// Flags of a `get` command: a list, or an already comma-joined string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flags {
    List(Vec<String>),
    Joined(String),
}

impl Flags {
    fn into_value(self) -> Value {
        match self {
            Flags::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
            Flags::Joined(s) => Value::String(s),
        }
    }
}

impl From<&str> for Flags {
    fn from(s: &str) -> Self {
        Flags::Joined(s.to_string())
    }
}

impl From<String> for Flags {
    fn from(s: String) -> Self {
        Flags::Joined(s)
    }
}

impl From<Vec<String>> for Flags {
    fn from(items: Vec<String>) -> Self {
        Flags::List(items)
    }
}

impl From<Vec<&str>> for Flags {
    fn from(items: Vec<&str>) -> Self {
        Flags::List(items.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Flags {
    fn from(items: [&str; N]) -> Self {
        Flags::List(items.iter().map(|s| s.to_string()).collect())
    }
}

/// Arguments of a `get` command.
#[derive(Debug, Clone, PartialEq)]
pub struct GetQuery {
    /// Database type, e.g. `vn`, `release`, `votelist`.
    pub kind: String,
    pub flags: Flags,
    /// Filter expression; parentheses are normalized by the builder.
    pub filters: String,
    /// `page`, `results`, `sort`, `reverse`, ...
    pub options: Map<String, Value>,
}

impl GetQuery {
    pub fn new(
        kind: impl Into<String>,
        flags: impl Into<Flags>,
        filters: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            flags: flags.into(),
            filters: filters.into(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl From<GetQuery> for Command {
    fn from(query: GetQuery) -> Self {
        let mut args = Map::new();
        args.insert("type".into(), query.kind.into());
        args.insert("flags".into(), query.flags.into_value());
        args.insert("filters".into(), query.filters.into());
        args.insert("options".into(), Value::Object(query.options));
        Command::Get(Some(Value::Object(args)))
    }
}

/// Arguments of a `set` command.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRequest {
    pub kind: String,
    pub id: u64,
    pub fields: Map<String, Value>,
}

impl SetRequest {
    pub fn new(kind: impl Into<String>, id: u64) -> Self {
        Self {
            kind: kind.into(),
            id,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl From<SetRequest> for Command {
    fn from(req: SetRequest) -> Self {
        let mut args = Map::new();
        args.insert("type".into(), req.kind.into());
        args.insert("id".into(), req.id.into());
        args.insert("fields".into(), Value::Object(req.fields));
        Command::Set(Some(Value::Object(args)))
    }
}
