//! Reconciles snapshots and deltas from the daemon into the registry.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    time::Instant,
};

use log::{error, warn};

use crate::{
    model::{Attributes, EntityId, EntityKind, Value},
    rate::RateEstimator,
    registry::{Registry, Upsert},
    schema::schema,
};

/// Rate estimator state is kept per entity and rate attribute.
pub type RateKey = (EntityKind, EntityId, &'static str);

/// One entity as reported by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: EntityId,
    pub attributes: Attributes,
    /// The daemon restarted this entity's counters; rates start over.
    pub counters_reset: bool,
}

impl Record {
    pub fn new(id: impl Into<EntityId>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
            counters_reset: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// The complete set of entities of one kind; anything absent is evicted.
    Snapshot { kind: EntityKind, records: Vec<Record> },
    /// Changes relative to what the registry already holds.
    Delta {
        kind: EntityKind,
        records: Vec<Record>,
        removed: Vec<EntityId>,
    },
}

impl Update {
    pub fn kind(&self) -> EntityKind {
        match self {
            Update::Snapshot { kind, .. } | Update::Delta { kind, .. } => *kind,
        }
    }
}

/// Updates fetched together; applied as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub observed_at: Instant,
    pub updates: Vec<Update>,
}

impl Batch {
    pub fn new(observed_at: Instant) -> Self {
        Self {
            observed_at,
            updates: Vec::new(),
        }
    }

    pub fn with(mut self, update: Update) -> Self {
        self.updates.push(update);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<EntityId>,
    pub changed: BTreeSet<EntityId>,
    pub removed: BTreeSet<EntityId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    MissingAttributes {
        kind: EntityKind,
        id: EntityId,
        missing: Vec<&'static str>,
    },
    DuplicateIdentifier { kind: EntityKind, id: EntityId },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::MissingAttributes { kind, id, missing } => write!(
                f,
                "dropped {} {id}: missing {}",
                kind.singular(),
                missing.join(", ")
            ),
            SyncWarning::DuplicateIdentifier { kind, id } => {
                write!(f, "skipped duplicate {} {id}", kind.singular())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub changes: BTreeMap<EntityKind, ChangeSet>,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    /// Kinds whose lists must recompute.
    pub fn affected_kinds(&self) -> Vec<EntityKind> {
        self.changes
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.changes.get(&kind).map_or(0, |c| {
            c.added.len() + c.changed.len() + c.removed.len()
        })
    }

    /// One line for the status bar: the first warning and how many followed.
    pub fn summary(&self) -> Option<String> {
        let first = self.warnings.first()?;
        Some(match self.warnings.len() - 1 {
            0 => first.to_string(),
            more => format!("{first} (+{more} more)"),
        })
    }

    fn entry(&mut self, kind: EntityKind) -> &mut ChangeSet {
        self.changes.entry(kind).or_default()
    }
}

/// Applies a batch in order. Callers hold the workspace lock for the whole
/// call so no reader sees a partially applied batch.
pub fn apply(
    registry: &mut Registry,
    rates: &mut RateEstimator<RateKey>,
    batch: Batch,
) -> SyncReport {
    let mut report = SyncReport::default();
    for update in batch.updates {
        match update {
            Update::Snapshot { kind, records } => {
                let seen = upsert_records(
                    registry,
                    rates,
                    kind,
                    records,
                    Merge::Replace,
                    batch.observed_at,
                    &mut report,
                );
                let stale: Vec<EntityId> = registry
                    .ids(kind)
                    .into_iter()
                    .filter(|id| !seen.contains(id))
                    .collect();
                for id in stale {
                    evict(registry, rates, kind, &id, &mut report);
                }
            }
            Update::Delta {
                kind,
                records,
                removed,
            } => {
                upsert_records(
                    registry,
                    rates,
                    kind,
                    records,
                    Merge::Patch,
                    batch.observed_at,
                    &mut report,
                );
                for id in removed {
                    evict(registry, rates, kind, &id, &mut report);
                }
            }
        }
    }
    report
}

/// How a record lands on an entity that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    /// Snapshot records are the whole truth; unreported attributes go away.
    Replace,
    /// Delta records carry only what changed.
    Patch,
}

fn upsert_records(
    registry: &mut Registry,
    rates: &mut RateEstimator<RateKey>,
    kind: EntityKind,
    records: Vec<Record>,
    merge: Merge,
    observed_at: Instant,
    report: &mut SyncReport,
) -> BTreeSet<EntityId> {
    let schema = schema(kind);
    let mut seen = BTreeSet::new();
    for mut record in records {
        if seen.contains(&record.id) {
            error!(
                "duplicate {} identifier {} in one update; skipping record",
                kind.singular(),
                record.id
            );
            report.warnings.push(SyncWarning::DuplicateIdentifier {
                kind,
                id: record.id,
            });
            continue;
        }
        if merge == Merge::Replace || !registry.contains(kind, &record.id) {
            let missing = schema.missing_required(&record.attributes);
            if !missing.is_empty() {
                warn!(
                    "dropping {} {}: missing {}",
                    kind.singular(),
                    record.id,
                    missing.join(", ")
                );
                report.warnings.push(SyncWarning::MissingAttributes {
                    kind,
                    id: record.id,
                    missing,
                });
                continue;
            }
        }

        if record.counters_reset {
            rates.retain(|(k, id, _)| !(*k == kind && *id == record.id));
        }
        for spec in schema.rates {
            let Some(bytes) = record.attributes.get(spec.counter).and_then(Value::as_f64) else {
                continue;
            };
            let rate = rates.update(
                (kind, record.id.clone(), spec.rate),
                observed_at,
                bytes.max(0.0) as u64,
            );
            record
                .attributes
                .insert(spec.rate.to_string(), Value::Float(rate));
        }

        if merge == Merge::Replace {
            // Derived rates survive a record that omits their counter.
            if let Some(existing) = registry.get(kind, &record.id) {
                for spec in schema.rates {
                    if let Some(rate) = existing.get(spec.rate) {
                        record
                            .attributes
                            .entry(spec.rate.to_string())
                            .or_insert_with(|| rate.clone());
                    }
                }
            }
        }

        seen.insert(record.id.clone());
        let outcome = match merge {
            Merge::Replace => registry.replace(kind, record.id.clone(), record.attributes),
            Merge::Patch => registry.upsert(kind, record.id.clone(), record.attributes),
        };
        match outcome {
            Upsert::Added => {
                report.entry(kind).added.insert(record.id);
            }
            Upsert::Changed => {
                report.entry(kind).changed.insert(record.id);
            }
            Upsert::Unchanged => {}
        }
    }
    seen
}

/// Removes an entity, its rate state and, for parents, every child entity.
fn evict(
    registry: &mut Registry,
    rates: &mut RateEstimator<RateKey>,
    kind: EntityKind,
    id: &EntityId,
    report: &mut SyncReport,
) {
    if registry.remove(kind, id).is_none() {
        return;
    }
    rates.retain(|(k, key_id, _)| !(*k == kind && key_id == id));
    report.entry(kind).removed.insert(id.clone());

    for child_kind in schema(kind).capabilities.sub_lists {
        let Some(attribute) = schema(*child_kind).parent else {
            continue;
        };
        for child in registry.children(*child_kind, attribute, id) {
            evict(registry, rates, *child_kind, &child, report);
        }
    }
}
