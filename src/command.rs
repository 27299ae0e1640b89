//! Commands that key bindings and the command prompt resolve to.

use std::{fmt, str::FromStr};

use crate::{
    error::CommandError,
    filter::Filter,
    keymap::Context,
    model::EntityKind,
    schema::schema,
    sort::{SortKey, SortSpec},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortRequest {
    Replace(Vec<SortKey>),
    /// Make the key primary and keep the rest of the chain.
    Add(SortKey),
    /// Back to the configured default.
    Reset,
    /// Identifier order.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRequest {
    /// Filter text, parsed against the focused list's kind when run.
    Push(String),
    Pop,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    By(isize),
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Command,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a new list. Child kinds are scoped to the focused torrent.
    Open {
        kind: EntityKind,
        filter: Option<String>,
    },
    Sort(SortRequest),
    Filter(FilterRequest),
    Move(Motion),
    Close,
    /// One-based tab position.
    FocusTab(usize),
    Start,
    Stop,
    Remove { delete_data: bool },
    Refresh,
    Prompt(PromptKind),
    Help,
    Quit,
}

/// Something a list must support before a command may run on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    SubList(EntityKind),
    Sort,
    Filter,
    /// Start, stop and remove act on torrents.
    Control,
}

impl Requirement {
    pub fn check(self, kind: EntityKind) -> Result<(), CommandError> {
        let caps = schema(kind).capabilities;
        let (ok, action) = match self {
            Requirement::SubList(child) => (caps.can_open(child), format!("open {child}")),
            Requirement::Sort => (caps.sort, "sort".to_string()),
            Requirement::Filter => (caps.filter, "filter".to_string()),
            Requirement::Control => (kind == EntityKind::Torrent, "start, stop or remove".to_string()),
        };
        if ok {
            Ok(())
        } else {
            Err(CommandError::MissingCapability { kind, action })
        }
    }
}

impl Command {
    pub fn requirement(&self) -> Option<Requirement> {
        match self {
            Command::Open { kind, .. } if schema(*kind).parent.is_some() => {
                Some(Requirement::SubList(*kind))
            }
            Command::Sort(_) => Some(Requirement::Sort),
            Command::Filter(_) => Some(Requirement::Filter),
            Command::Start | Command::Stop | Command::Remove { .. } => Some(Requirement::Control),
            _ => None,
        }
    }

    /// Checks a binding before it is accepted. Commands bound in a list
    /// context must be supported by that kind and any attribute they name
    /// must exist there.
    pub fn validate_for(&self, context: Option<Context>) -> Result<(), CommandError> {
        let kinds: Vec<EntityKind> = match context {
            Some(Context::List(kind)) => vec![kind],
            _ => EntityKind::ALL.to_vec(),
        };
        let supported = |kind: &EntityKind| -> Result<(), CommandError> {
            if let Some(requirement) = self.requirement() {
                requirement.check(*kind)?;
            }
            match self {
                Command::Sort(SortRequest::Replace(keys)) => {
                    SortSpec::new(*kind, keys)?;
                }
                Command::Sort(SortRequest::Add(key)) => {
                    SortSpec::new(*kind, std::slice::from_ref(key))?;
                }
                Command::Filter(FilterRequest::Push(text)) => {
                    Filter::parse(*kind, text)?;
                }
                Command::Open {
                    kind: opened,
                    filter: Some(text),
                } => {
                    Filter::parse(*opened, text)?;
                }
                _ => {}
            }
            Ok(())
        };
        // Context-free bindings only need to make sense somewhere.
        let mut first_error = None;
        for kind in &kinds {
            match supported(kind) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn bad(command: &'static str, reason: impl Into<String>) -> CommandError {
    CommandError::BadArgument {
        command,
        reason: reason.into(),
    }
}

fn no_args(command: &'static str, args: &[&str], value: Command) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(value)
    } else {
        Err(bad(command, format!("unexpected argument {:?}", args.join(" "))))
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let Some((name, args)) = words.split_first() else {
            return Err(CommandError::Unknown(String::new()));
        };
        match *name {
            "open" | "ls" => {
                let (kind, rest) = args
                    .split_first()
                    .ok_or_else(|| bad("open", "missing list kind"))?;
                let kind = kind
                    .parse::<EntityKind>()
                    .map_err(|err| bad("open", err.to_string()))?;
                let filter = (!rest.is_empty()).then(|| rest.join(" "));
                Ok(Command::Open { kind, filter })
            }
            "sort" => match args {
                [] => Err(bad("sort", "missing sort keys")),
                ["--reset"] => Ok(Command::Sort(SortRequest::Reset)),
                ["--none"] => Ok(Command::Sort(SortRequest::Clear)),
                ["--add", key] => Ok(Command::Sort(SortRequest::Add(key.parse()?))),
                ["--add", ..] => Err(bad("sort", "--add takes exactly one key")),
                keys => {
                    let keys = keys
                        .iter()
                        .flat_map(|k| k.split(','))
                        .filter(|k| !k.is_empty())
                        .map(str::parse)
                        .collect::<Result<Vec<SortKey>, _>>()?;
                    Ok(Command::Sort(SortRequest::Replace(keys)))
                }
            },
            "filter" => match args {
                [] => Err(bad("filter", "missing filter expression")),
                ["--pop"] => Ok(Command::Filter(FilterRequest::Pop)),
                ["--clear"] => Ok(Command::Filter(FilterRequest::Clear)),
                expr => Ok(Command::Filter(FilterRequest::Push(expr.join(" ")))),
            },
            "move" => match args {
                ["top"] => Ok(Command::Move(Motion::First)),
                ["bottom"] => Ok(Command::Move(Motion::Last)),
                [n] => n
                    .parse::<isize>()
                    .map(|n| Command::Move(Motion::By(n)))
                    .map_err(|_| bad("move", format!("expected top, bottom or a number, got {n:?}"))),
                _ => Err(bad("move", "expected one argument")),
            },
            "tab" => match args {
                [n] => match n.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Command::FocusTab(n)),
                    _ => Err(bad("tab", format!("expected a tab number, got {n:?}"))),
                },
                _ => Err(bad("tab", "expected one argument")),
            },
            "prompt" => match args {
                ["command"] => Ok(Command::Prompt(PromptKind::Command)),
                ["filter"] => Ok(Command::Prompt(PromptKind::Filter)),
                _ => Err(bad("prompt", "expected command or filter")),
            },
            "remove" => match args {
                [] => Ok(Command::Remove { delete_data: false }),
                ["--delete-files"] => Ok(Command::Remove { delete_data: true }),
                _ => Err(bad("remove", "only --delete-files is accepted")),
            },
            "close" => no_args("close", args, Command::Close),
            "start" => no_args("start", args, Command::Start),
            "stop" => no_args("stop", args, Command::Stop),
            "refresh" => no_args("refresh", args, Command::Refresh),
            "help" => no_args("help", args, Command::Help),
            "quit" => no_args("quit", args, Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Open { kind, filter: None } => write!(f, "open {kind}"),
            Command::Open {
                kind,
                filter: Some(filter),
            } => write!(f, "open {kind} {filter}"),
            Command::Sort(SortRequest::Replace(keys)) => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                write!(f, "sort {}", keys.join(" "))
            }
            Command::Sort(SortRequest::Add(key)) => write!(f, "sort --add {key}"),
            Command::Sort(SortRequest::Reset) => f.write_str("sort --reset"),
            Command::Sort(SortRequest::Clear) => f.write_str("sort --none"),
            Command::Filter(FilterRequest::Push(text)) => write!(f, "filter {text}"),
            Command::Filter(FilterRequest::Pop) => f.write_str("filter --pop"),
            Command::Filter(FilterRequest::Clear) => f.write_str("filter --clear"),
            Command::Move(Motion::By(n)) => write!(f, "move {n}"),
            Command::Move(Motion::First) => f.write_str("move top"),
            Command::Move(Motion::Last) => f.write_str("move bottom"),
            Command::Close => f.write_str("close"),
            Command::FocusTab(n) => write!(f, "tab {n}"),
            Command::Start => f.write_str("start"),
            Command::Stop => f.write_str("stop"),
            Command::Remove { delete_data: false } => f.write_str("remove"),
            Command::Remove { delete_data: true } => f.write_str("remove --delete-files"),
            Command::Refresh => f.write_str("refresh"),
            Command::Prompt(PromptKind::Command) => f.write_str("prompt command"),
            Command::Prompt(PromptKind::Filter) => f.write_str("prompt filter"),
            Command::Help => f.write_str("help"),
            Command::Quit => f.write_str("quit"),
        }
    }
}
