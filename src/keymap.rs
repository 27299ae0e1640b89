//! Keys, key chains and context-scoped bindings.
//!
//! Keys are written as `x`, `X`, `ctrl-x`, `alt-x` (or `meta-x`), `shift-x`,
//! `enter`, `space`, `page down`, `f5`, ... Modifiers may be joined with `-`
//! or a space and combined freely. A chain is several keys separated by
//! spaces (`t s`) or `+` (`t+s`).

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{error::KeyError, model::EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

const NAMES: &[(&str, KeyCode)] = &[
    ("enter", KeyCode::Enter),
    ("return", KeyCode::Enter),
    ("esc", KeyCode::Esc),
    ("escape", KeyCode::Esc),
    ("space", KeyCode::Char(' ')),
    ("tab", KeyCode::Tab),
    ("backtab", KeyCode::BackTab),
    ("backspace", KeyCode::Backspace),
    ("up", KeyCode::Up),
    ("down", KeyCode::Down),
    ("left", KeyCode::Left),
    ("right", KeyCode::Right),
    ("home", KeyCode::Home),
    ("pos1", KeyCode::Home),
    ("end", KeyCode::End),
    ("pgup", KeyCode::PageUp),
    ("page up", KeyCode::PageUp),
    ("pageup", KeyCode::PageUp),
    ("pgdn", KeyCode::PageDown),
    ("page down", KeyCode::PageDown),
    ("pagedown", KeyCode::PageDown),
    ("ins", KeyCode::Insert),
    ("insert", KeyCode::Insert),
    ("del", KeyCode::Delete),
    ("delete", KeyCode::Delete),
];

impl KeyCode {
    fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=12).contains(&n).then_some(KeyCode::F(n));
        }
        NAMES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, code)| *code)
    }

    fn name(self) -> String {
        match self {
            KeyCode::Char(' ') => "space".into(),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::F(n) => format!("f{n}"),
            KeyCode::PageUp => "pgup".into(),
            KeyCode::PageDown => "pgdn".into(),
            other => NAMES
                .iter()
                .find(|(_, code)| *code == other)
                .map(|(name, _)| name.to_string())
                .unwrap_or_default(),
        }
    }
}

/// A single key press, normalised so that equivalent spellings compare equal:
/// `shift-a` is `A`, `ctrl-A` is `ctrl-a`, `meta-x` is `alt-x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub code: KeyCode,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Key {
    pub fn new(code: KeyCode) -> Self {
        Self::with_modifiers(code, false, false, false)
    }

    pub fn char(c: char) -> Self {
        Self::new(KeyCode::Char(c))
    }

    pub fn with_modifiers(code: KeyCode, ctrl: bool, alt: bool, shift: bool) -> Self {
        let (code, shift) = match code {
            KeyCode::Char('\n') | KeyCode::Char('\r') => (KeyCode::Enter, shift),
            KeyCode::Char('\t') => (KeyCode::Tab, shift),
            KeyCode::Char(c) if shift && c.is_alphabetic() => (upper(c), false),
            other => (other, shift),
        };
        let code = match code {
            KeyCode::Char(c) if ctrl => KeyCode::Char(lower(c)),
            other => other,
        };
        Self {
            code,
            ctrl,
            alt,
            shift,
        }
    }

    pub fn is_esc(&self) -> bool {
        self.code == KeyCode::Esc && !self.ctrl && !self.alt && !self.shift
    }
}

fn upper(c: char) -> KeyCode {
    KeyCode::Char(c.to_uppercase().next().unwrap_or(c))
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeyError::Empty);
        }
        let mut rest = match s.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
            Some(inner) if !inner.is_empty() => inner,
            _ => s,
        };
        let (mut ctrl, mut alt, mut shift) = (false, false, false);

        loop {
            if rest.chars().count() == 1 {
                break;
            }
            let Some(sep) = rest.find(['-', ' ']).filter(|at| *at > 0) else {
                break;
            };
            let word = &rest[..sep];
            match word.to_lowercase().as_str() {
                "ctrl" | "control" => ctrl = true,
                "alt" | "meta" => alt = true,
                "shift" => shift = true,
                _ if KeyCode::from_name(rest).is_some() => break,
                _ if rest[sep..].starts_with('-') => {
                    return Err(KeyError::InvalidModifier(word.to_string()))
                }
                _ => break,
            }
            rest = &rest[sep + 1..];
            if rest.is_empty() {
                return Err(KeyError::MissingKey(s.to_string()));
            }
        }

        let mut chars = rest.chars();
        let code = match (chars.next(), chars.next()) {
            (Some(c), None) => KeyCode::Char(c),
            _ => KeyCode::from_name(rest).ok_or_else(|| KeyError::UnknownKey(s.to_string()))?,
        };
        Ok(Key::with_modifiers(code, ctrl, alt, shift))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("ctrl-")?;
        }
        if self.alt {
            f.write_str("alt-")?;
        }
        if self.shift {
            f.write_str("shift-")?;
        }
        f.write_str(&self.code.name())
    }
}

/// One or more keys pressed in sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyChain(Vec<Key>);

impl KeyChain {
    pub fn new(keys: Vec<Key>) -> Result<Self, KeyError> {
        if keys.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(keys))
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &[Key]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<Key> for KeyChain {
    fn from(key: Key) -> Self {
        Self(vec![key])
    }
}

impl FromStr for KeyChain {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "page down" and "meta  " are single keys despite the spaces.
        let single = s.parse::<Key>();
        if let Ok(key) = single {
            return Ok(key.into());
        }
        let parts: Vec<&str> = if s.trim().contains(char::is_whitespace) {
            s.split_whitespace().collect()
        } else if s.len() > 1 && s.contains('+') {
            s.split('+').collect()
        } else {
            return single.map(Into::into);
        };
        let keys = parts
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<Key>, _>>()?;
        KeyChain::new(keys)
    }
}

impl fmt::Display for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&keys.join(" "))
    }
}

/// Where a binding applies. Lookups try the most specific context first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Context {
    /// Active whenever a list of this kind has focus.
    List(EntityKind),
    Tabs,
    Main,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::List(kind) => f.write_str(kind.singular()),
            Context::Tabs => f.write_str("tabs"),
            Context::Main => f.write_str("main"),
        }
    }
}

impl FromStr for Context {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(Context::Main),
            "tabs" => Ok(Context::Tabs),
            other => other
                .trim_end_matches("list")
                .parse::<EntityKind>()
                .map(Context::List)
                .map_err(|_| KeyError::UnknownKey(format!("context {s}"))),
        }
    }
}

fn context_label(context: Option<Context>) -> String {
    context.map_or_else(|| "any context".to_string(), |c| c.to_string())
}

/// Result of resolving the keys pressed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a, A> {
    /// A chain completed; run its action.
    Complete(&'a A),
    /// Keys so far are a proper prefix of at least one chain.
    Partial,
    /// Nothing starts with these keys.
    Unbound,
}

#[derive(Debug, Clone)]
pub struct KeyMap<A> {
    bindings: BTreeMap<(Option<Context>, KeyChain), A>,
}

impl<A> Default for KeyMap<A> {
    fn default() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }
}

impl<A> KeyMap<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `keys` in `context` (`None` for everywhere), replacing any previous binding.
    pub fn bind(&mut self, keys: KeyChain, context: Option<Context>, action: A) {
        self.bindings.insert((context, keys), action);
    }

    /// Removes every chain in `context` starting with `keys`.
    pub fn unbind(&mut self, keys: &KeyChain, context: Option<Context>) -> Result<(), KeyError> {
        let before = self.bindings.len();
        self.bindings
            .retain(|(ctx, chain), _| !(*ctx == context && chain.starts_with(keys.keys())));
        if self.bindings.len() == before {
            return Err(KeyError::NotMapped {
                key: keys.to_string(),
                context: context_label(context),
            });
        }
        Ok(())
    }

    pub fn get(&self, keys: &KeyChain, context: Option<Context>) -> Option<&A> {
        self.bindings.get(&(context, keys.clone()))
    }

    /// Resolves `pressed` in `contexts` (most specific first), then in
    /// context-free bindings. An exact match in an earlier context wins over
    /// longer chains anywhere.
    pub fn resolve(&self, pressed: &[Key], contexts: &[Context]) -> Resolution<'_, A> {
        let scopes = contexts.iter().copied().map(Some).chain([None]);
        let mut partial = false;
        for scope in scopes {
            for ((ctx, chain), action) in &self.bindings {
                if *ctx != scope || !chain.starts_with(pressed) {
                    continue;
                }
                if chain.len() == pressed.len() {
                    return Resolution::Complete(action);
                }
                partial = true;
            }
        }
        if partial {
            Resolution::Partial
        } else {
            Resolution::Unbound
        }
    }

    /// Bindings in context order, for the help screen.
    pub fn iter(&self) -> impl Iterator<Item = (Option<Context>, &KeyChain, &A)> {
        self.bindings
            .iter()
            .map(|((ctx, chain), action)| (*ctx, chain, action))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Default bindings as `(keys, context, command)` text, parsed at startup.
pub const DEFAULT_BINDINGS: &[(&str, &str, &str)] = &[
    ("q", "main", "quit"),
    ("?", "main", "help"),
    ("f1", "main", "help"),
    (":", "main", "prompt command"),
    ("/", "main", "prompt filter"),
    ("ctrl-r", "main", "refresh"),
    ("j", "main", "move 1"),
    ("down", "main", "move 1"),
    ("k", "main", "move -1"),
    ("up", "main", "move -1"),
    ("ctrl-d", "main", "move 10"),
    ("pgdn", "main", "move 10"),
    ("ctrl-u", "main", "move -10"),
    ("pgup", "main", "move -10"),
    ("g g", "main", "move top"),
    ("home", "main", "move top"),
    ("G", "main", "move bottom"),
    ("end", "main", "move bottom"),
    ("n t", "main", "open torrents"),
    ("F", "main", "filter --pop"),
    ("ctrl-f", "main", "filter --clear"),
    ("s ,", "main", "sort --reset"),
    ("s .", "main", "sort --none"),
    ("d", "tabs", "close"),
    ("alt-1", "tabs", "tab 1"),
    ("alt-2", "tabs", "tab 2"),
    ("alt-3", "tabs", "tab 3"),
    ("alt-4", "tabs", "tab 4"),
    ("alt-5", "tabs", "tab 5"),
    ("alt-6", "tabs", "tab 6"),
    ("alt-7", "tabs", "tab 7"),
    ("alt-8", "tabs", "tab 8"),
    ("alt-9", "tabs", "tab 9"),
    ("n p", "torrent", "open peers"),
    ("n r", "torrent", "open trackers"),
    ("n f", "torrent", "open files"),
    ("enter", "torrent", "open files"),
    ("t s", "torrent", "start"),
    ("t S", "torrent", "stop"),
    ("t d", "torrent", "remove"),
    ("t D", "torrent", "remove --delete-files"),
    ("f a", "torrent", "filter active"),
    ("f p", "torrent", "filter paused"),
    ("f c", "torrent", "filter complete"),
    ("f d", "torrent", "filter downloading"),
    ("f s", "torrent", "filter seeding"),
    ("f l", "torrent", "filter leeching"),
    ("f i", "torrent", "filter isolated"),
    ("s n", "torrent", "sort --add name"),
    ("s N", "torrent", "sort --add !name"),
    ("s s", "torrent", "sort --add size"),
    ("s S", "torrent", "sort --add !size"),
    ("s p", "torrent", "sort --add progress"),
    ("s P", "torrent", "sort --add !progress"),
    ("s d", "torrent", "sort --add rate-down"),
    ("s D", "torrent", "sort --add !rate-down"),
    ("s u", "torrent", "sort --add rate-up"),
    ("s U", "torrent", "sort --add !rate-up"),
    ("s t", "torrent", "sort --add status"),
    ("s T", "torrent", "sort --add !status"),
    ("s r", "torrent", "sort --add ratio"),
    ("s R", "torrent", "sort --add !ratio"),
    ("s e", "torrent", "sort --add eta"),
    ("s E", "torrent", "sort --add !eta"),
    ("f u", "peer", "filter uploading"),
    ("f d", "peer", "filter downloading"),
    ("s a", "peer", "sort --add address"),
    ("s A", "peer", "sort --add !address"),
    ("s d", "peer", "sort --add rate-down"),
    ("s D", "peer", "sort --add !rate-down"),
    ("s u", "peer", "sort --add rate-up"),
    ("s U", "peer", "sort --add !rate-up"),
    ("s e", "peer", "sort --add rate-est"),
    ("s E", "peer", "sort --add !rate-est"),
    ("s p", "peer", "sort --add progress"),
    ("s P", "peer", "sort --add !progress"),
    ("s u", "tracker", "sort --add url"),
    ("s U", "tracker", "sort --add !url"),
    ("s t", "tracker", "sort --add status"),
    ("s T", "tracker", "sort --add !status"),
    ("s n", "file", "sort --add name"),
    ("s N", "file", "sort --add !name"),
    ("s s", "file", "sort --add size"),
    ("s S", "file", "sort --add !size"),
    ("s p", "file", "sort --add progress"),
    ("s P", "file", "sort --add !progress"),
    ("s r", "file", "sort --add priority"),
    ("s R", "file", "sort --add !priority"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        s.parse().unwrap()
    }

    fn chain(s: &str) -> KeyChain {
        s.parse().unwrap()
    }

    #[test]
    fn equivalent_spellings_compare_equal() {
        assert_eq!(key("alt-l"), key("meta-l"));
        assert_eq!(key("<alt-l>"), key("meta-l"));
        assert_eq!(key("alt-L"), key("meta-shift-l"));
        assert_eq!(key("shift-e"), key("E"));
        assert_eq!(key("shift-ö"), key("Ö"));
        assert_eq!(key("ctrl-E"), key("ctrl-e"));
        assert_eq!(key("enter"), key("return"));
        assert_eq!(key("\n"), key("enter"));
        assert_eq!(key("space"), key(" "));
        assert_eq!(key("meta  "), key("alt-space"));
        assert_eq!(key("meta page up"), key("alt-pgup"));
        assert_eq!(key("home"), key("pos1"));
        assert_eq!(key("ins"), key("insert"));
        assert_eq!(key("shift-Ctrl-RETURN"), key("ctrl-shift-enter"));
        assert_ne!(key("e"), key("E"));
    }

    #[test]
    fn punctuation_and_function_keys() {
        assert_eq!(key("-"), Key::char('-'));
        assert_eq!(key("alt--"), Key::with_modifiers(KeyCode::Char('-'), false, true, false));
        assert_eq!(key("ctrl-+"), Key::with_modifiers(KeyCode::Char('+'), true, false, false));
        assert_eq!(key("f12"), Key::new(KeyCode::F(12)));
        assert!("f13".parse::<Key>().is_err());
    }

    #[test]
    fn invalid_keys_are_reported() {
        assert_eq!("".parse::<Key>(), Err(KeyError::Empty));
        assert_eq!(
            "shit-e".parse::<Key>(),
            Err(KeyError::InvalidModifier("shit".into()))
        );
        assert_eq!("alt-".parse::<Key>(), Err(KeyError::MissingKey("alt-".into())));
        assert_eq!("hello".parse::<Key>(), Err(KeyError::UnknownKey("hello".into())));
        assert!(matches!("alt-hello".parse::<Key>(), Err(KeyError::UnknownKey(_))));
    }

    #[test]
    fn displays_canonical_names() {
        assert_eq!(key("meta-shift-l").to_string(), "alt-L");
        assert_eq!(key("page down").to_string(), "pgdn");
        assert_eq!(key("return").to_string(), "enter");
        assert_eq!(chain("t+S").to_string(), "t S");
    }

    #[test]
    fn chains_split_on_space_or_plus() {
        assert_eq!(chain("x y z"), chain("x+y+z"));
        assert_eq!(chain("x +").keys(), &[key("x"), key("+")]);
        assert_eq!(chain("+ x").keys(), &[key("+"), key("x")]);
        assert_eq!(chain("+ + +").len(), 3);
        assert_eq!(chain("ctrl-a b").keys(), &[key("ctrl-a"), key("b")]);
        assert_eq!(chain("+").len(), 1);
        assert!("x foo".parse::<KeyChain>().is_err());
    }

    #[test]
    fn contexts_parse_by_name() {
        assert_eq!("main".parse::<Context>(), Ok(Context::Main));
        assert_eq!("torrentlist".parse::<Context>(), Ok(Context::List(EntityKind::Torrent)));
        assert_eq!("peers".parse::<Context>(), Ok(Context::List(EntityKind::Peer)));
        assert!("nowhere".parse::<Context>().is_err());
    }

    #[test]
    fn resolve_prefers_specific_context() {
        let mut map = KeyMap::new();
        map.bind(chain("d"), Some(Context::Main), "main");
        map.bind(chain("d"), Some(Context::List(EntityKind::Peer)), "peer");
        map.bind(chain("x"), None, "anywhere");
        let in_peers = [Context::List(EntityKind::Peer), Context::Tabs, Context::Main];
        let in_torrents = [Context::List(EntityKind::Torrent), Context::Tabs, Context::Main];
        assert_eq!(map.resolve(&[key("d")], &in_peers), Resolution::Complete(&"peer"));
        assert_eq!(map.resolve(&[key("d")], &in_torrents), Resolution::Complete(&"main"));
        assert_eq!(map.resolve(&[key("x")], &in_torrents), Resolution::Complete(&"anywhere"));
        assert_eq!(map.resolve(&[key("y")], &in_torrents), Resolution::Unbound);
    }

    #[test]
    fn resolve_reports_partial_chains() {
        let mut map = KeyMap::new();
        map.bind(chain("1 2 3"), Some(Context::Main), "short");
        map.bind(chain("1 2 3 4"), Some(Context::Main), "long");
        let ctx = [Context::Main];
        assert_eq!(map.resolve(&[key("1")], &ctx), Resolution::Partial);
        assert_eq!(map.resolve(&[key("1"), key("2")], &ctx), Resolution::Partial);
        assert_eq!(
            map.resolve(&[key("1"), key("2"), key("3")], &ctx),
            Resolution::Complete(&"short")
        );
        assert_eq!(map.resolve(&[key("1"), key("3")], &ctx), Resolution::Unbound);
    }

    #[test]
    fn unbind_removes_chains_by_prefix() {
        let mut map = KeyMap::new();
        map.bind(chain("1 2 3"), Some(Context::Main), "a");
        map.bind(chain("1 2 4"), Some(Context::Main), "b");
        map.bind(chain("1 2 3"), Some(Context::Tabs), "c");
        map.unbind(&chain("1 2"), Some(Context::Main)).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.unbind(&chain("1"), Some(Context::Main)),
            Err(KeyError::NotMapped {
                key: "1".into(),
                context: "main".into()
            })
        );
        assert!(map.unbind(&chain("1"), None).is_err());
    }

    #[test]
    fn rebinding_replaces_action() {
        let mut map = KeyMap::new();
        map.bind(chain("q"), Some(Context::Main), "quit");
        map.bind(chain("q"), Some(Context::Main), "help");
        assert_eq!(map.get(&chain("q"), Some(Context::Main)), Some(&"help"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn default_bindings_parse() {
        for (keys, context, _) in DEFAULT_BINDINGS {
            assert!(keys.parse::<KeyChain>().is_ok(), "{keys}");
            assert!(context.parse::<Context>().is_ok(), "{context}");
        }
    }
}
