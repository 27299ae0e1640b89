//! Sort specifications: an ordered comparator chain ending in the identifier.

use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{
    error::ViewError,
    model::{Entity, EntityKind, Value},
    schema::{schema, Comparator},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }
}

/// A requested sort key before it is checked against a kind's schema.
///
/// Parses from `name`, `!name` (descending), `name:asc` or `name:desc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub direction: Direction,
    /// Overrides the schema's comparator when set.
    pub comparator: Option<Comparator>,
}

impl SortKey {
    pub fn new(attribute: impl Into<String>, direction: Direction) -> Self {
        Self {
            attribute: attribute.into(),
            direction,
            comparator: None,
        }
    }

    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self::new(attribute, Direction::Ascending)
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self::new(attribute, Direction::Descending)
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }
}

impl FromStr for SortKey {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || ViewError::Syntax {
            what: "sort key",
            input: s.to_string(),
        };
        let mut text = s.trim();
        let mut direction = Direction::Ascending;
        if let Some(rest) = text.strip_prefix('!') {
            direction = Direction::Descending;
            text = rest;
        }
        if let Some((name, dir)) = text.split_once(':') {
            direction = match dir {
                "asc" => direction,
                "desc" => direction.flipped(),
                _ => return Err(syntax()),
            };
            text = name;
        }
        let valid = !text.is_empty()
            && text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(syntax());
        }
        Ok(SortKey::new(text.to_ascii_lowercase(), direction))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.direction == Direction::Descending {
            f.write_str("!")?;
        }
        f.write_str(&self.attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Criterion {
    attribute: &'static str,
    direction: Direction,
    comparator: Comparator,
}

/// A validated comparator chain for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    kind: EntityKind,
    criteria: Vec<Criterion>,
}

impl SortSpec {
    pub fn new(kind: EntityKind, keys: &[SortKey]) -> Result<Self, ViewError> {
        let schema = schema(kind);
        let mut criteria: Vec<Criterion> = Vec::with_capacity(keys.len());
        for key in keys {
            let spec = schema
                .attribute(&key.attribute)
                .ok_or_else(|| ViewError::UnknownAttribute {
                    kind,
                    attribute: key.attribute.clone(),
                })?;
            let comparator = match key.comparator {
                None => spec.comparator,
                Some(requested) if requested == spec.comparator => requested,
                Some(Comparator::Lexicographic) => Comparator::Lexicographic,
                Some(requested) => {
                    return Err(ViewError::IncompatibleComparator {
                        attribute: key.attribute.clone(),
                        how: requested.label(),
                    })
                }
            };
            // Later duplicates can never decide anything.
            if criteria.iter().any(|c| c.attribute == spec.name) {
                continue;
            }
            criteria.push(Criterion {
                attribute: spec.name,
                direction: key.direction,
                comparator,
            });
        }
        Ok(Self { kind, criteria })
    }

    /// Parses whitespace or comma separated keys, e.g. `"!size name"`.
    pub fn parse(kind: EntityKind, text: &str) -> Result<Self, ViewError> {
        let keys = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<SortKey>, _>>()?;
        Self::new(kind, &keys)
    }

    /// Identifier order only.
    pub fn none(kind: EntityKind) -> Self {
        Self {
            kind,
            criteria: Vec::new(),
        }
    }

    /// The schema's built-in default for `kind`.
    pub fn builtin(kind: EntityKind) -> Self {
        let keys: Vec<SortKey> = schema(kind)
            .default_sort
            .iter()
            .map(|name| SortKey::ascending(*name))
            .collect();
        Self::new(kind, &keys).unwrap_or_else(|_| Self::none(kind))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn keys(&self) -> Vec<SortKey> {
        self.criteria
            .iter()
            .map(|c| SortKey {
                attribute: c.attribute.to_string(),
                direction: c.direction,
                comparator: Some(c.comparator),
            })
            .collect()
    }

    /// Makes `key` the primary key, dropping any other key on the same attribute.
    pub fn with_primary(&self, key: &SortKey) -> Result<Self, ViewError> {
        let mut keys = vec![key.clone()];
        keys.extend(
            self.keys()
                .into_iter()
                .filter(|existing| existing.attribute != key.attribute),
        );
        Self::new(self.kind, &keys)
    }

    /// Total order: the criteria chain, then ascending identifier.
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        self.criteria
            .iter()
            .map(|criterion| criterion.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    }
}

impl Criterion {
    fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        // Missing values trail in either direction.
        let (a, b) = match (a.get(self.attribute), b.get(self.attribute)) {
            (Some(a), Some(b)) => (a, b),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        };
        let ordering = match self.comparator {
            Comparator::Numeric => a.cmp_numeric(b),
            Comparator::Lexicographic => compare_text(a, b),
            Comparator::Enumerated(order) => {
                rank(order, a).cmp(&rank(order, b)).then_with(|| compare_text(a, b))
            }
        };
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

fn compare_text(a: &Value, b: &Value) -> Ordering {
    let (a, b) = (a.to_string(), b.to_string());
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(&b))
}

fn rank(order: &[&str], value: &Value) -> usize {
    value
        .as_str()
        .and_then(|label| order.iter().position(|known| *known == label))
        .unwrap_or(order.len())
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.criteria.is_empty() {
            return f.write_str("(none)");
        }
        let keys: Vec<String> = self.keys().iter().map(ToString::to_string).collect();
        f.write_str(&keys.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attributes, EntityId};

    fn torrent(id: &str, pairs: &[(&str, Value)]) -> Entity {
        let attrs: Attributes = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Entity::new(EntityKind::Torrent, EntityId::from(id), attrs)
    }

    fn sorted(spec: &SortSpec, mut entities: Vec<Entity>) -> Vec<String> {
        entities.sort_by(|a, b| spec.compare(a, b));
        entities.into_iter().map(|e| e.id.to_string()).collect()
    }

    #[test]
    fn parses_key_syntax() {
        assert_eq!("!size".parse::<SortKey>(), Ok(SortKey::descending("size")));
        assert_eq!("Name:desc".parse::<SortKey>(), Ok(SortKey::descending("name")));
        assert_eq!("!eta:desc".parse::<SortKey>(), Ok(SortKey::ascending("eta")));
        assert!("size:sideways".parse::<SortKey>().is_err());
        assert!("".parse::<SortKey>().is_err());
    }

    #[test]
    fn rejects_unknown_attribute() {
        let err = SortSpec::parse(EntityKind::Torrent, "size bogus").unwrap_err();
        assert!(matches!(err, ViewError::UnknownAttribute { .. }));
    }

    #[test]
    fn rejects_incompatible_comparator() {
        let key = SortKey::ascending("name").with_comparator(Comparator::Numeric);
        assert!(matches!(
            SortSpec::new(EntityKind::Torrent, &[key]),
            Err(ViewError::IncompatibleComparator { .. })
        ));
        let key = SortKey::ascending("size").with_comparator(Comparator::Lexicographic);
        assert!(SortSpec::new(EntityKind::Torrent, &[key]).is_ok());
    }

    #[test]
    fn size_descending_ties_break_by_identifier() {
        let spec = SortSpec::parse(EntityKind::Torrent, "!size").unwrap();
        let entities = vec![
            torrent("C", &[("size", Value::Int(10))]),
            torrent("B", &[("size", Value::Int(5))]),
            torrent("A", &[("size", Value::Int(10))]),
        ];
        assert_eq!(sorted(&spec, entities), ["A", "C", "B"]);
    }

    #[test]
    fn status_sorts_by_priority_not_label() {
        let spec = SortSpec::parse(EntityKind::Torrent, "status").unwrap();
        let entities = vec![
            torrent("1", &[("status", "stopped".into())]),
            torrent("2", &[("status", "seeding".into())]),
            torrent("3", &[("status", "downloading".into())]),
            torrent("4", &[("status", "mystery".into())]),
        ];
        assert_eq!(sorted(&spec, entities), ["3", "2", "1", "4"]);
    }

    #[test]
    fn missing_values_trail_in_both_directions() {
        let entities = || {
            vec![
                torrent("a", &[]),
                torrent("b", &[("ratio", Value::Float(0.5))]),
                torrent("c", &[("ratio", Value::Float(2.0))]),
            ]
        };
        let up = SortSpec::parse(EntityKind::Torrent, "ratio").unwrap();
        let down = SortSpec::parse(EntityKind::Torrent, "!ratio").unwrap();
        assert_eq!(sorted(&up, entities()), ["b", "c", "a"]);
        assert_eq!(sorted(&down, entities()), ["c", "b", "a"]);
    }

    #[test]
    fn with_primary_moves_key_to_front() {
        let spec = SortSpec::parse(EntityKind::Torrent, "name !size").unwrap();
        let spec = spec.with_primary(&SortKey::ascending("size")).unwrap();
        assert_eq!(spec.to_string(), "size name");
        assert_eq!(SortSpec::none(EntityKind::Peer).to_string(), "(none)");
    }

    #[test]
    fn builtin_defaults_resolve() {
        for kind in EntityKind::ALL {
            assert!(!SortSpec::builtin(kind).is_empty(), "{kind}");
        }
    }
}
