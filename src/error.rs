use thiserror::Error;

use crate::model::EntityKind;

/// Rejected sort or filter requests. The list keeps its previous state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("{kind} have no attribute {attribute:?}")]
    UnknownAttribute {
        kind: EntityKind,
        attribute: String,
    },
    #[error("cannot compare {attribute:?} {how}")]
    IncompatibleComparator {
        attribute: String,
        how: &'static str,
    },
    #[error("invalid value {value:?} for {attribute:?}: {reason}")]
    InvalidValue {
        attribute: String,
        value: String,
        reason: String,
    },
    #[error("{kind} cannot be filtered by {preset:?}")]
    UnknownPreset { kind: EntityKind, preset: String },
    #[error("malformed {what}: {input:?}")]
    Syntax { what: &'static str, input: String },
    #[error("{kind} lists cannot be {action}")]
    Unsupported {
        kind: EntityKind,
        action: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabError {
    #[error("cannot open more than {max} tabs")]
    Capacity { max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("No key given")]
    Empty,
    #[error("Invalid modifier {0:?}")]
    InvalidModifier(String),
    #[error("Missing key after modifier in {0:?}")]
    MissingKey(String),
    #[error("Unknown key {0:?}")]
    UnknownKey(String),
    #[error("Key not mapped in {context}: {key}")]
    NotMapped { key: String, context: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{command}: {reason}")]
    BadArgument {
        command: &'static str,
        reason: String,
    },
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("{kind} lists cannot {action}")]
    MissingCapability {
        kind: EntityKind,
        action: String,
    },
    #[error(transparent)]
    Tab(#[from] TabError),
    #[error("no {0} is focused")]
    NothingFocused(&'static str),
    #[error("the daemon does not report {0}")]
    Unavailable(EntityKind),
}

/// Startup validation failures; configuration is rejected as a whole.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sort default for {kind}: {source}")]
    Sort {
        kind: EntityKind,
        #[source]
        source: ViewError,
    },
    #[error("filter default for {kind}: {source}")]
    Filter {
        kind: EntityKind,
        #[source]
        source: ViewError,
    },
    #[error("key binding {key:?}: {source}")]
    Key {
        key: String,
        #[source]
        source: KeyError,
    },
    #[error("key binding {key:?}: {source}")]
    Action {
        key: String,
        #[source]
        source: CommandError,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("daemon source does not provide {0}")]
    MissingKind(EntityKind),
    #[error(transparent)]
    Daemon(Box<dyn std::error::Error + Send + Sync>),
}
