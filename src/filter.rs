//! Filter predicates over entity attributes.
//!
//! Syntax: `[!]attribute OP value` with OP one of `= != < <= > >= ~`, or
//! `[!]preset` for the named filters a kind supports (`active`, `paused`, ...).
//! Numeric operands accept `k M G T` (powers of 1000) and `Ki Mi Gi Ti`
//! (powers of 1024) suffixes.

use std::{cmp::Ordering, fmt};

use crate::{
    error::ViewError,
    model::{Entity, EntityKind, Value},
    schema::{schema, Comparator},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

impl Op {
    // Longest tokens first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, Op); 7] = [
        ("!=", Op::Ne),
        ("<=", Op::Le),
        (">=", Op::Ge),
        ("=", Op::Eq),
        ("<", Op::Lt),
        (">", Op::Gt),
        ("~", Op::Contains),
    ];

    fn token(self) -> &'static str {
        Self::TOKENS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(token, _)| *token)
            .unwrap_or("?")
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Op::Eq => ordering.is_eq(),
            Op::Ne => ordering.is_ne(),
            Op::Lt => ordering.is_lt(),
            Op::Le => ordering.is_le(),
            Op::Gt => ordering.is_gt(),
            Op::Ge => ordering.is_ge(),
            Op::Contains => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Test {
    Compare {
        attribute: &'static str,
        comparator: Comparator,
        op: Op,
        operand: Value,
    },
    Preset(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    kind: EntityKind,
    test: Test,
    inverted: bool,
}

impl Filter {
    pub fn parse(kind: EntityKind, text: &str) -> Result<Self, ViewError> {
        let trimmed = text.trim();
        let (inverted, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        if body.is_empty() {
            return Err(ViewError::Syntax {
                what: "filter",
                input: text.to_string(),
            });
        }

        let found = Op::TOKENS
            .iter()
            .filter_map(|(token, op)| body.find(token).map(|at| (at, *token, *op)))
            .min_by_key(|(at, token, _)| (*at, usize::MAX - token.len()));

        let test = match found {
            Some((at, token, op)) => {
                let name = body[..at].trim().to_ascii_lowercase();
                let raw = body[at + token.len()..].trim();
                compare_test(kind, &name, op, raw)?
            }
            None => preset_test(kind, body)?,
        };
        Ok(Self {
            kind,
            test,
            inverted,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        let hit = match &self.test {
            Test::Compare {
                attribute,
                comparator,
                op,
                operand,
            } => entity
                .get(attribute)
                .is_some_and(|value| compare(*comparator, *op, value, operand)),
            Test::Preset(name) => preset_matches(self.kind, name, entity),
        };
        hit != self.inverted
    }
}

fn compare_test(kind: EntityKind, name: &str, op: Op, raw: &str) -> Result<Test, ViewError> {
    let spec = schema(kind)
        .attribute(name)
        .ok_or_else(|| ViewError::UnknownAttribute {
            kind,
            attribute: name.to_string(),
        })?;
    let invalid = |reason: &str| ViewError::InvalidValue {
        attribute: spec.name.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    if raw.is_empty() {
        return Err(invalid("missing value"));
    }
    let operand = match spec.comparator {
        Comparator::Numeric => {
            if op == Op::Contains {
                return Err(ViewError::IncompatibleComparator {
                    attribute: spec.name.to_string(),
                    how: "by substring",
                });
            }
            Value::Float(parse_number(raw).ok_or_else(|| invalid("not a number"))?)
        }
        Comparator::Lexicographic => Value::Text(raw.to_string()),
        Comparator::Enumerated(order) => {
            let label = raw.to_ascii_lowercase();
            if op != Op::Contains && !order.contains(&label.as_str()) {
                return Err(invalid(&format!("expected one of {}", order.join(", "))));
            }
            Value::Text(label)
        }
    };
    Ok(Test::Compare {
        attribute: spec.name,
        comparator: spec.comparator,
        op,
        operand,
    })
}

fn preset_test(kind: EntityKind, body: &str) -> Result<Test, ViewError> {
    let name = body.trim().to_ascii_lowercase();
    schema(kind)
        .presets
        .iter()
        .copied()
        .find(|preset| *preset == name)
        .map(Test::Preset)
        .ok_or(ViewError::UnknownPreset { kind, preset: name })
}

fn compare(comparator: Comparator, op: Op, value: &Value, operand: &Value) -> bool {
    match comparator {
        Comparator::Numeric => match (value.as_f64(), operand.as_f64()) {
            (Some(a), Some(b)) => op.holds(a.total_cmp(&b)),
            _ => false,
        },
        Comparator::Lexicographic => {
            let a = value.to_string().to_lowercase();
            let b = operand.to_string().to_lowercase();
            match op {
                Op::Contains => a.contains(&b),
                _ => op.holds(a.cmp(&b)),
            }
        }
        Comparator::Enumerated(order) => {
            let a = value.to_string().to_lowercase();
            let b = operand.to_string();
            match op {
                Op::Contains => a.contains(&b),
                _ => {
                    let rank = |label: &str| {
                        order
                            .iter()
                            .position(|known| *known == label)
                            .unwrap_or(order.len())
                    };
                    op.holds(rank(&a).cmp(&rank(&b)))
                }
            }
        }
    }
}

fn preset_matches(kind: EntityKind, name: &str, entity: &Entity) -> bool {
    let positive = |attr: &str| entity.number(attr).is_some_and(|v| v > 0.0);
    let status = entity.text("status").unwrap_or_default();
    let progress = entity.number("progress").unwrap_or(0.0);
    match (kind, name) {
        (EntityKind::Torrent, "active") => positive("rate-down") || positive("rate-up"),
        (EntityKind::Torrent, "paused") => status == "stopped",
        (EntityKind::Torrent, "complete") => progress >= 100.0,
        (EntityKind::Torrent, "downloading") => status == "downloading",
        (EntityKind::Torrent, "seeding") => status == "seeding",
        (EntityKind::Torrent, "leeching") => progress < 100.0 && status != "stopped",
        (EntityKind::Torrent, "isolated") => status == "isolated",
        (_, "uploading") => positive("rate-up"),
        (EntityKind::Peer, "downloading") => positive("rate-down"),
        _ => false,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let text = raw.trim();
    let text = text.strip_suffix("/s").unwrap_or(text);
    let text = ["B", "b", "%"]
        .iter()
        .find_map(|unit| text.strip_suffix(unit))
        .unwrap_or(text);
    const UNITS: [(&str, f64); 8] = [
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
    ];
    let (number, factor) = UNITS
        .iter()
        .find_map(|(suffix, factor)| text.strip_suffix(suffix).map(|n| (n, *factor)))
        .unwrap_or((text, 1.0));
    let value: f64 = number.trim().parse().ok()?;
    value.is_finite().then_some(value * factor)
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            f.write_str("!")?;
        }
        match &self.test {
            Test::Compare {
                attribute,
                op,
                operand,
                ..
            } => write!(f, "{attribute}{}{operand}", op.token()),
            Test::Preset(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attributes, EntityId};

    fn torrent(pairs: &[(&str, Value)]) -> Entity {
        let attrs: Attributes = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Entity::new(EntityKind::Torrent, EntityId::from("1"), attrs)
    }

    fn check(text: &str, entity: &Entity) -> bool {
        Filter::parse(EntityKind::Torrent, text).unwrap().matches(entity)
    }

    #[test]
    fn numeric_comparisons_with_units() {
        let t = torrent(&[("size", Value::Int(2 * 1024 * 1024))]);
        assert!(check("size >= 2Mi", &t));
        assert!(check("size>1M", &t));
        assert!(!check("size<1MiB", &t));
        assert!(check("!size<1MiB", &t));
        assert!(check("size != 0", &t));
    }

    #[test]
    fn numbers_accept_displayed_units() {
        let t = torrent(&[
            ("rate-down", Value::Float(1_500_000.0)),
            ("progress", Value::Float(12.5)),
        ]);
        assert!(check("rate-down>1MiB/s", &t));
        assert!(check("rate-down>500kB/s", &t));
        assert!(!check("rate-down>2MB/s", &t));
        assert!(check("progress>10%", &t));
        assert!(!check("progress>=20%", &t));
        assert_eq!(parse_number("1MiB/s"), Some(1_048_576.0));
        assert_eq!(parse_number("500kB/s"), Some(500_000.0));
        assert_eq!(parse_number("10%"), Some(10.0));
        assert_eq!(parse_number("B"), None);
    }

    #[test]
    fn text_comparisons_ignore_case() {
        let t = torrent(&[("name", "Debian-12.iso".into())]);
        assert!(check("name~debian", &t));
        assert!(check("name = debian-12.ISO", &t));
        assert!(!check("name~ubuntu", &t));
    }

    #[test]
    fn enumerated_values_are_checked_and_ranked() {
        let t = torrent(&[("status", "seeding".into())]);
        assert!(check("status=seeding", &t));
        assert!(check("status>downloading", &t));
        assert!(matches!(
            Filter::parse(EntityKind::Torrent, "status=sleeping"),
            Err(ViewError::InvalidValue { .. })
        ));
    }

    #[test]
    fn missing_attribute_never_matches() {
        let t = torrent(&[]);
        assert!(!check("ratio>1", &t));
        assert!(check("!ratio>1", &t));
    }

    #[test]
    fn presets_follow_torrent_state() {
        let paused = torrent(&[
            ("status", "stopped".into()),
            ("progress", Value::Float(40.0)),
        ]);
        assert!(check("paused", &paused));
        assert!(!check("leeching", &paused));
        assert!(check("!complete", &paused));
        let seeding = torrent(&[
            ("status", "seeding".into()),
            ("progress", Value::Float(100.0)),
            ("rate-up", Value::Float(12.0)),
        ]);
        assert!(check("active", &seeding));
        assert!(check("uploading", &seeding));
        assert!(check("complete", &seeding));
    }

    #[test]
    fn isolated_preset_ignores_local_errors() {
        let local_error = torrent(&[
            ("status", "downloading".into()),
            ("error", "No data found! Ensure your drives are connected".into()),
        ]);
        assert!(!check("isolated", &local_error));
        let isolated = torrent(&[
            ("status", "isolated".into()),
            ("error", "Tracker gave HTTP response code 404".into()),
        ]);
        assert!(check("isolated", &isolated));
    }

    #[test]
    fn rejects_bad_filters() {
        let kind = EntityKind::Torrent;
        assert!(matches!(
            Filter::parse(kind, "bogus>1"),
            Err(ViewError::UnknownAttribute { .. })
        ));
        assert!(matches!(
            Filter::parse(kind, "size~10"),
            Err(ViewError::IncompatibleComparator { .. })
        ));
        assert!(matches!(
            Filter::parse(kind, "size>lots"),
            Err(ViewError::InvalidValue { .. })
        ));
        assert!(matches!(
            Filter::parse(EntityKind::File, "paused"),
            Err(ViewError::UnknownPreset { .. })
        ));
        assert!(matches!(Filter::parse(kind, "!"), Err(ViewError::Syntax { .. })));
    }

    #[test]
    fn displays_normalised_form() {
        let filter = Filter::parse(EntityKind::Torrent, "! Size >= 10").unwrap();
        assert_eq!(filter.to_string(), "!size>=10");
        assert_eq!(
            Filter::parse(EntityKind::Peer, "uploading").unwrap().to_string(),
            "uploading"
        );
    }
}
