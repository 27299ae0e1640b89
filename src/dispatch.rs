//! Turns key presses into commands, collecting multi-key chains.

use std::time::{Duration, Instant};

use log::debug;

use crate::{
    command::Command,
    error::ConfigError,
    keymap::{Context, Key, KeyChain, KeyMap, Resolution, DEFAULT_BINDINGS},
    model::EntityKind,
};

pub const DEFAULT_CHAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChainState {
    Idle,
    Collecting { keys: Vec<Key>, since: Instant },
}

/// What a key press did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// A chain completed.
    Run(Command),
    /// The key extended a pending chain.
    Pending,
    /// A lone key with no binding.
    Unbound(Key),
    /// The key did not continue the pending chain; all keys are dropped.
    Aborted(Vec<Key>),
    /// Esc cancelled the pending chain.
    Cancelled,
}

/// Contexts for a focused list, most specific first.
pub fn contexts_for(kind: EntityKind) -> [Context; 3] {
    [Context::List(kind), Context::Tabs, Context::Main]
}

/// Parses and validates `(keys, context, command)` bindings into `map`. An
/// empty command or `none` unbinds. The first invalid binding aborts.
pub fn bind_all<'a>(
    map: &mut KeyMap<Command>,
    bindings: impl IntoIterator<Item = (&'a str, Option<&'a str>, &'a str)>,
) -> Result<(), ConfigError> {
    for (keys, context, action) in bindings {
        let key_error = |source| ConfigError::Key {
            key: keys.to_string(),
            source,
        };
        let chain: KeyChain = keys.parse().map_err(key_error)?;
        let context = context
            .map(str::parse::<Context>)
            .transpose()
            .map_err(key_error)?;
        let action = action.trim();
        if action.is_empty() || action == "none" {
            map.unbind(&chain, context).map_err(key_error)?;
            continue;
        }
        let action_error = |source| ConfigError::Action {
            key: keys.to_string(),
            source,
        };
        let command: Command = action.parse().map_err(action_error)?;
        command.validate_for(context).map_err(action_error)?;
        map.bind(chain, context, command);
    }
    Ok(())
}

pub fn default_keymap() -> Result<KeyMap<Command>, ConfigError> {
    let mut map = KeyMap::new();
    bind_all(
        &mut map,
        DEFAULT_BINDINGS
            .iter()
            .map(|(keys, context, action)| (*keys, Some(*context), *action)),
    )?;
    Ok(map)
}

#[derive(Debug)]
pub struct Dispatcher {
    keymap: KeyMap<Command>,
    timeout: Duration,
    state: ChainState,
}

impl Dispatcher {
    pub fn new(keymap: KeyMap<Command>, timeout: Duration) -> Self {
        Self {
            keymap,
            timeout,
            state: ChainState::Idle,
        }
    }

    pub fn keymap(&self) -> &KeyMap<Command> {
        &self.keymap
    }

    /// Keys of the pending chain, empty when idle.
    pub fn pending(&self) -> &[Key] {
        match &self.state {
            ChainState::Idle => &[],
            ChainState::Collecting { keys, .. } => keys,
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, ChainState::Collecting { .. })
    }

    pub fn feed(&mut self, key: Key, contexts: &[Context], now: Instant) -> Feed {
        self.expire(now);
        let mut keys = match std::mem::replace(&mut self.state, ChainState::Idle) {
            ChainState::Idle => Vec::new(),
            ChainState::Collecting { .. } if key.is_esc() => return Feed::Cancelled,
            ChainState::Collecting { keys, .. } => keys,
        };
        let fresh = keys.is_empty();
        keys.push(key);

        match self.keymap.resolve(&keys, contexts) {
            Resolution::Complete(command) => Feed::Run(command.clone()),
            Resolution::Partial => {
                self.state = ChainState::Collecting { keys, since: now };
                Feed::Pending
            }
            Resolution::Unbound if fresh => Feed::Unbound(key),
            Resolution::Unbound => {
                debug!("aborted key chain after {} keys", keys.len());
                Feed::Aborted(keys)
            }
        }
    }

    /// Abandons a pending chain that has been idle longer than the timeout.
    /// Returns whether one was abandoned.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.expire(now)
    }

    pub fn cancel(&mut self) {
        self.state = ChainState::Idle;
    }

    fn expire(&mut self, now: Instant) -> bool {
        let expired = match &self.state {
            ChainState::Collecting { since, .. } => {
                now.saturating_duration_since(*since) > self.timeout
            }
            ChainState::Idle => false,
        };
        if expired {
            debug!("key chain timed out");
            self.state = ChainState::Idle;
        }
        expired
    }
}
