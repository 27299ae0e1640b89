//! Declarative per-kind attribute tables consulted by the generic list machinery.

use crate::model::{Attributes, EntityKind};

/// How two values of one attribute are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Numeric,
    /// Case-insensitive string order.
    Lexicographic,
    /// Position in a defined priority order; unknown labels sort last.
    Enumerated(&'static [&'static str]),
}

impl Comparator {
    pub fn label(self) -> &'static str {
        match self {
            Comparator::Numeric => "numerically",
            Comparator::Lexicographic => "lexicographically",
            Comparator::Enumerated(_) => "by priority",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub comparator: Comparator,
    pub required: bool,
}

const fn num(name: &'static str) -> AttributeSpec {
    AttributeSpec {
        name,
        comparator: Comparator::Numeric,
        required: false,
    }
}

const fn text(name: &'static str) -> AttributeSpec {
    AttributeSpec {
        name,
        comparator: Comparator::Lexicographic,
        required: false,
    }
}

const fn states(name: &'static str, order: &'static [&'static str]) -> AttributeSpec {
    AttributeSpec {
        name,
        comparator: Comparator::Enumerated(order),
        required: false,
    }
}

const fn required(spec: AttributeSpec) -> AttributeSpec {
    AttributeSpec {
        required: true,
        ..spec
    }
}

/// What a list of this kind lets the user do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub sub_lists: &'static [EntityKind],
    pub sort: bool,
    pub filter: bool,
}

impl Capabilities {
    pub fn can_open(&self, kind: EntityKind) -> bool {
        self.sub_lists.contains(&kind)
    }
}

/// A cumulative counter attribute and the smoothed rate attribute derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    pub counter: &'static str,
    pub rate: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub kind: EntityKind,
    pub attributes: &'static [AttributeSpec],
    pub capabilities: Capabilities,
    pub rates: &'static [RateSpec],
    pub presets: &'static [&'static str],
    /// Attribute naming the owning torrent for child kinds.
    pub parent: Option<&'static str>,
    pub default_sort: &'static [&'static str],
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSpec> {
        self.attributes.iter().find(|spec| spec.name == name)
    }

    pub fn has_preset(&self, name: &str) -> bool {
        self.presets.contains(&name)
    }

    /// Required attributes absent from `attributes`.
    pub fn missing_required(&self, attributes: &Attributes) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|spec| spec.required && !attributes.contains_key(spec.name))
            .map(|spec| spec.name)
            .collect()
    }
}

pub const TORRENT_STATUS: &[&str] = &[
    "downloading",
    "seeding",
    "checking",
    "download-wait",
    "seed-wait",
    "check-wait",
    "isolated",
    "stopped",
];

pub const TRACKER_STATUS: &[&str] = &["announcing", "waiting", "queued", "inactive"];

pub const FILE_PRIORITY: &[&str] = &["high", "normal", "low", "shun"];

static TORRENT: Schema = Schema {
    kind: EntityKind::Torrent,
    attributes: &[
        required(text("name")),
        states("status", TORRENT_STATUS),
        num("size"),
        num("downloaded"),
        num("uploaded"),
        num("progress"),
        num("rate-down"),
        num("rate-up"),
        num("ratio"),
        num("eta"),
        num("peers"),
        num("seeds"),
        text("dir"),
        text("tracker"),
        text("error"),
        num("added"),
    ],
    capabilities: Capabilities {
        sub_lists: &[EntityKind::Peer, EntityKind::Tracker, EntityKind::File],
        sort: true,
        filter: true,
    },
    rates: &[
        RateSpec {
            counter: "downloaded",
            rate: "rate-down",
        },
        RateSpec {
            counter: "uploaded",
            rate: "rate-up",
        },
    ],
    presets: &[
        "active",
        "paused",
        "complete",
        "downloading",
        "seeding",
        "uploading",
        "leeching",
        "isolated",
    ],
    parent: None,
    default_sort: &["name"],
};

static PEER: Schema = Schema {
    kind: EntityKind::Peer,
    attributes: &[
        required(text("torrent")),
        required(text("address")),
        text("client"),
        num("progress"),
        num("rate-down"),
        num("rate-up"),
        num("rate-est"),
    ],
    capabilities: Capabilities {
        sub_lists: &[],
        sort: true,
        filter: true,
    },
    rates: &[RateSpec {
        counter: "torrent-progress-bytes",
        rate: "rate-est",
    }],
    presets: &["uploading", "downloading"],
    parent: Some("torrent"),
    default_sort: &["torrent"],
};

static TRACKER: Schema = Schema {
    kind: EntityKind::Tracker,
    attributes: &[
        required(text("torrent")),
        required(text("url")),
        states("status", TRACKER_STATUS),
        num("seeds"),
        num("leeches"),
        num("last-announce"),
    ],
    capabilities: Capabilities {
        sub_lists: &[],
        sort: true,
        filter: true,
    },
    rates: &[],
    presets: &[],
    parent: Some("torrent"),
    default_sort: &["url"],
};

static FILE: Schema = Schema {
    kind: EntityKind::File,
    attributes: &[
        required(text("torrent")),
        required(text("name")),
        num("size"),
        num("downloaded"),
        num("progress"),
        states("priority", FILE_PRIORITY),
    ],
    capabilities: Capabilities {
        sub_lists: &[],
        sort: true,
        filter: true,
    },
    rates: &[],
    presets: &[],
    parent: Some("torrent"),
    default_sort: &["name"],
};

pub fn schema(kind: EntityKind) -> &'static Schema {
    match kind {
        EntityKind::Torrent => &TORRENT,
        EntityKind::Peer => &PEER,
        EntityKind::Tracker => &TRACKER,
        EntityKind::File => &FILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attributes;

    #[test]
    fn every_rate_target_is_a_numeric_attribute() {
        for kind in EntityKind::ALL {
            let schema = schema(kind);
            for rate in schema.rates {
                let spec = schema.attribute(rate.rate).unwrap();
                assert_eq!(spec.comparator, Comparator::Numeric, "{kind}: {}", rate.rate);
            }
        }
    }

    #[test]
    fn default_sorts_name_known_attributes() {
        for kind in EntityKind::ALL {
            let schema = schema(kind);
            for key in schema.default_sort {
                assert!(schema.attribute(key).is_some(), "{kind}: {key}");
            }
        }
    }

    #[test]
    fn files_cannot_open_sub_lists() {
        let caps = schema(EntityKind::File).capabilities;
        assert!(!caps.can_open(EntityKind::Peer));
        assert!(schema(EntityKind::Torrent).capabilities.can_open(EntityKind::Peer));
    }

    #[test]
    fn reports_missing_required_attributes() {
        let attrs = attributes([("address", "10.0.0.1:51413")]);
        assert_eq!(schema(EntityKind::Peer).missing_required(&attrs), vec!["torrent"]);
    }
}
