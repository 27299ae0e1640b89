//! Property tests for list views over arbitrary torrent sets.

use std::{collections::BTreeMap, time::Instant};

use proptest::prelude::*;
use transmission_dashboard::{
    model::{attributes, EntityId, EntityKind, Value},
    sync::{Batch, Record, Update},
    workspace::{ViewDefaults, Workspace},
};

fn records(sizes: &[(String, i64)]) -> Vec<Record> {
    sizes
        .iter()
        .map(|(id, size)| {
            Record::new(
                id.as_str(),
                attributes([("name", Value::from(id.as_str())), ("size", Value::Int(*size))]),
            )
        })
        .collect()
}

fn workspace_with(sizes: &[(String, i64)]) -> Workspace {
    let mut ws = Workspace::new(ViewDefaults::default());
    ws.apply(Batch::new(Instant::now()).with(Update::Snapshot {
        kind: EntityKind::Torrent,
        records: records(sizes),
    }));
    ws
}

fn visible(ws: &mut Workspace) -> Vec<String> {
    let view = ws.current_view().unwrap();
    view.rows.iter().map(|e| e.id.to_string()).collect()
}

fn torrent_sets() -> impl Strategy<Value = (Vec<(String, i64)>, Vec<(String, i64)>)> {
    prop::collection::btree_map("[a-z]{1,4}", 0i64..50, 0..24).prop_flat_map(
        |map: BTreeMap<String, i64>| {
            let ordered: Vec<(String, i64)> = map.into_iter().collect();
            (Just(ordered.clone()), Just(ordered).prop_shuffle())
        },
    )
}

/// One synchronizer update or cursor motion in a generated session.
#[derive(Debug, Clone)]
enum Step {
    Snapshot(Vec<(String, i64)>),
    Delta {
        records: Vec<(String, i64)>,
        removed: Vec<String>,
    },
    Move(isize),
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    let entries = || {
        prop::collection::btree_map("[a-f]", 0i64..20, 0..6)
            .prop_map(|map| map.into_iter().collect::<Vec<_>>())
    };
    let step = prop_oneof![
        entries().prop_map(Step::Snapshot),
        (entries(), prop::collection::vec("[a-f]", 0..3))
            .prop_map(|(records, removed)| Step::Delta { records, removed }),
        (-8isize..8).prop_map(Step::Move),
    ];
    prop::collection::vec(step, 1..16)
}

/// Ids of the expected rows: `size >= threshold`, largest first, ties by id.
fn brute_force(model: &BTreeMap<String, i64>, threshold: i64) -> Vec<String> {
    let mut expected: Vec<(&String, &i64)> =
        model.iter().filter(|(_, size)| **size >= threshold).collect();
    expected.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    expected.into_iter().map(|(id, _)| id.clone()).collect()
}

proptest! {
    /// Every prefix of an update sequence leaves the view equal to a
    /// brute-force evaluation of the same registry contents.
    #[test]
    fn view_tracks_update_sequences(steps in steps(), threshold in 0i64..20) {
        let mut ws = Workspace::new(ViewDefaults::default());
        ws.execute(&"sort !size".parse().unwrap());
        ws.execute(&format!("filter size>={threshold}").parse().unwrap());
        let mut model: BTreeMap<String, i64> = BTreeMap::new();

        for step in steps {
            match step {
                Step::Snapshot(entries) => {
                    model = entries.iter().cloned().collect();
                    ws.apply(Batch::new(Instant::now()).with(Update::Snapshot {
                        kind: EntityKind::Torrent,
                        records: records(&entries),
                    }));
                }
                Step::Delta { records: entries, removed } => {
                    model.extend(entries.iter().cloned());
                    for id in &removed {
                        model.remove(id);
                    }
                    ws.apply(Batch::new(Instant::now()).with(Update::Delta {
                        kind: EntityKind::Torrent,
                        records: records(&entries),
                        removed: removed.iter().map(|id| EntityId::from(id.as_str())).collect(),
                    }));
                }
                Step::Move(by) => {
                    ws.execute(&format!("move {by}").parse().unwrap());
                }
            }

            let first = ws.current_view().unwrap();
            let second = ws.current_view().unwrap();
            let ids: Vec<String> = first.rows.iter().map(|e| e.id.to_string()).collect();
            let again: Vec<String> = second.rows.iter().map(|e| e.id.to_string()).collect();
            prop_assert_eq!(&ids, &brute_force(&model, threshold));
            prop_assert_eq!(&ids, &again);
            prop_assert_eq!(first.focus, second.focus);
            match first.focus {
                Some(index) => prop_assert!(index < first.rows.len()),
                None => prop_assert!(first.rows.is_empty()),
            }
        }
    }

    /// The view equals a brute-force filter and sort of the registry.
    #[test]
    fn view_matches_brute_force((sizes, _) in torrent_sets(), threshold in 0i64..50) {
        let mut ws = workspace_with(&sizes);
        ws.execute(&"sort !size".parse().unwrap());
        ws.execute(&format!("filter size>={threshold}").parse().unwrap());

        let mut expected: Vec<&(String, i64)> =
            sizes.iter().filter(|(_, size)| *size >= threshold).collect();
        expected.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let expected: Vec<String> = expected.into_iter().map(|(id, _)| id.clone()).collect();

        prop_assert_eq!(visible(&mut ws), expected);
    }

    /// Arrival order of records never changes the rendered order.
    #[test]
    fn order_is_independent_of_arrival((sizes, shuffled) in torrent_sets()) {
        let mut a = workspace_with(&sizes);
        let mut b = workspace_with(&shuffled);
        for ws in [&mut a, &mut b] {
            ws.execute(&"sort size".parse().unwrap());
        }
        prop_assert_eq!(visible(&mut a), visible(&mut b));
    }

    /// Focus always points at a visible row after the set shrinks.
    #[test]
    fn focus_stays_in_bounds((sizes, _) in torrent_sets(), steps in 0isize..30, keep in 0usize..24) {
        let mut ws = workspace_with(&sizes);
        ws.execute(&format!("move {steps}").parse().unwrap());
        let survivors: Vec<(String, i64)> = sizes.iter().take(keep).cloned().collect();
        ws.apply(Batch::new(Instant::now()).with(Update::Snapshot {
            kind: EntityKind::Torrent,
            records: records(&survivors),
        }));
        let view = ws.current_view().unwrap();
        match view.focus {
            Some(index) => prop_assert!(index < view.rows.len()),
            None => prop_assert!(view.rows.is_empty()),
        }
    }
}
