use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    str::FromStr,
    time::Duration,
};

/// The kinds of remote objects the dashboard tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Torrent,
    Peer,
    Tracker,
    File,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Torrent,
        EntityKind::Peer,
        EntityKind::Tracker,
        EntityKind::File,
    ];

    /// Plural label used for tab titles, config keys and keymap contexts.
    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Torrent => "torrents",
            EntityKind::Peer => "peers",
            EntityKind::Tracker => "trackers",
            EntityKind::File => "files",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            EntityKind::Torrent => "torrent",
            EntityKind::Peer => "peer",
            EntityKind::Tracker => "tracker",
            EntityKind::File => "file",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown list kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "torrent" | "torrents" | "t" => Ok(EntityKind::Torrent),
            "peer" | "peers" | "p" => Ok(EntityKind::Peer),
            "tracker" | "trackers" | "r" => Ok(EntityKind::Tracker),
            "file" | "files" | "f" => Ok(EntityKind::File),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Identifier of an entity, unique within its kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A typed attribute value as reported by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// Seconds since the Unix epoch.
    Time(i64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) | Value::Time(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Total order on the numeric reading of two values; non-numeric sorts last.
    pub fn cmp_numeric(&self, other: &Value) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) | Value::Time(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

pub type Attributes = BTreeMap<String, Value>;

/// One tracked remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: EntityId,
    pub attributes: Attributes,
}

impl Entity {
    pub fn new(kind: EntityKind, id: EntityId, attributes: Attributes) -> Self {
        Self {
            kind,
            id,
            attributes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Human readable label for tab titles and status messages.
    pub fn label(&self) -> String {
        self.text("name")
            .or_else(|| self.text("address"))
            .or_else(|| self.text("url"))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Builds an attribute map from `(name, value)` pairs.
pub fn attributes<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn scaled(value: f64, units: &[&'static str]) -> (f64, &'static str) {
    let mut magnitude = value.max(0.0);
    let mut unit = 0;
    while magnitude >= 1024.0 && unit < units.len() - 1 {
        magnitude /= 1024.0;
        unit += 1;
    }
    (magnitude, units[unit])
}

pub fn format_speed(value: f64) -> String {
    let (magnitude, unit) = scaled(value, &["B/s", "KiB/s", "MiB/s", "GiB/s", "TiB/s"]);
    format!("{:>4.1}{}", magnitude, unit)
}

pub fn format_bytes(value: f64) -> String {
    let (magnitude, unit) = scaled(value, &["B", "KiB", "MiB", "GiB", "TiB"]);
    format!("{:>4.1} {}", magnitude, unit)
}

pub fn format_progress(value: f64) -> String {
    format!("{:5.1}%", value)
}

pub fn format_eta(seconds: Option<i64>) -> String {
    match seconds {
        None => "∞".to_string(),
        Some(raw) if raw < 0 => "∞".to_string(),
        Some(raw) => {
            let duration = Duration::from_secs(raw as u64);
            let days = duration.as_secs() / 86_400;
            let hours = (duration.as_secs() % 86_400) / 3_600;
            let minutes = (duration.as_secs() % 3_600) / 60;
            let seconds = duration.as_secs() % 60;
            if days > 0 {
                format!("{}d{}h", days, hours)
            } else if hours > 0 {
                format!("{}h{}m", hours, minutes)
            } else if minutes > 0 {
                format!("{}m", minutes)
            } else {
                format!("{}s", seconds)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_singular_and_plural() {
        assert_eq!("peers".parse::<EntityKind>(), Ok(EntityKind::Peer));
        assert_eq!("Tracker".parse::<EntityKind>(), Ok(EntityKind::Tracker));
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn numeric_compare_puts_text_last() {
        let a = Value::Int(3);
        let b = Value::Float(2.5);
        let c = Value::Text("x".into());
        assert_eq!(a.cmp_numeric(&b), Ordering::Greater);
        assert_eq!(a.cmp_numeric(&c), Ordering::Less);
        assert_eq!(c.cmp_numeric(&c), Ordering::Equal);
    }

    #[test]
    fn label_falls_back_to_identifier() {
        let named = Entity::new(
            EntityKind::Torrent,
            "1".into(),
            attributes([("name", "ubuntu.iso")]),
        );
        let bare = Entity::new(EntityKind::File, "1/0".into(), Attributes::new());
        assert_eq!(named.label(), "ubuntu.iso");
        assert_eq!(bare.label(), "1/0");
    }

    #[test]
    fn formatters_scale_units() {
        assert_eq!(format_speed(2048.0), " 2.0KiB/s");
        assert_eq!(format_bytes(512.0), "512.0 B");
        assert_eq!(format_eta(Some(3_700)), "1h1m");
        assert_eq!(format_eta(Some(-1)), "∞");
    }
}
