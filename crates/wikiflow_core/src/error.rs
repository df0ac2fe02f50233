use crate::version::{ActionKind, Version};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{kind} does not support {requested}; supported: {}", format_versions(.supported))]
    UnsupportedVersion {
        kind: ActionKind,
        requested: Version,
        supported: Vec<Version>,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("failed to parse {context} response: {message}")]
    ProtocolParse { context: String, message: String },

    #[error("MediaWiki API error [{code}]: {info}{}", format_hint(.hint))]
    Business {
        code: String,
        info: String,
        hint: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl ActionError {
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolParse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business { .. })
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Business { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::Precondition(_) => "precondition",
            Self::ProtocolParse { .. } => "protocol_parse",
            Self::Business { .. } => "business",
            Self::Transport(_) => "transport",
            Self::IllegalState(_) => "illegal_state",
        }
    }
}

fn format_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_hint(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(" ({hint})"),
        None => String::new(),
    }
}
