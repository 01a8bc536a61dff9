//! Argument and protocol error types.

use crate::command::CommandKind;
use thiserror::Error;

/// Caller-supplied command data that fails validation.
///
/// Raised by the command builder before any output is produced, so a failed
/// build never reaches the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("{command} command is missing body argument.")]
    MissingBody { command: CommandKind },

    #[error("{command} command is missing {} argument(s).", .fields.join(", "))]
    MissingFields {
        command: CommandKind,
        fields: Vec<&'static str>,
    },

    #[error("{command} command has non-object {}argument.", field_prefix(.field))]
    NonObject {
        command: CommandKind,
        field: Option<&'static str>,
    },

    #[error("{command} command has non-numeric {field} argument.")]
    NonNumeric {
        command: CommandKind,
        field: &'static str,
    },
}

fn field_prefix(field: &Option<&'static str>) -> String {
    field.map(|f| format!("{} ", f)).unwrap_or_default()
}

/// Protocol-level errors raised while framing or decoding replies.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    #[error("frame too large: {size} bytes without sentinel (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("message contains the frame sentinel at byte {0}")]
    SentinelInMessage(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_lists_every_field() {
        let err = ArgumentError::MissingFields {
            command: CommandKind::Get,
            fields: vec!["type", "flags", "filters"],
        };
        assert_eq!(
            err.to_string(),
            "Get command is missing type, flags, filters argument(s)."
        );
    }

    #[test]
    fn test_non_object_display() {
        let err = ArgumentError::NonObject {
            command: CommandKind::Get,
            field: None,
        };
        assert_eq!(err.to_string(), "Get command has non-object argument.");

        let err = ArgumentError::NonObject {
            command: CommandKind::Set,
            field: Some("fields"),
        };
        assert_eq!(err.to_string(), "Set command has non-object fields argument.");
    }

    #[test]
    fn test_missing_body_display() {
        let err = ArgumentError::MissingBody {
            command: CommandKind::Login,
        };
        assert_eq!(err.to_string(), "Login command is missing body argument.");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnexpectedResponse("results invalid response".into());
        assert_eq!(
            err.to_string(),
            "Unexpected response: results invalid response"
        );

        let err = ProtocolError::FrameTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));

        let err = ProtocolError::SentinelInMessage(7);
        assert!(err.to_string().contains('7'));
    }
}
