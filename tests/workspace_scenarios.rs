use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use transmission_dashboard::{
    error::SourceError,
    model::{attributes, EntityId, EntityKind, Value},
    source::{poll_once, DaemonSource, RemoteAction},
    sync::{Batch, Record, Update},
    workspace::{lock, Effect, SharedWorkspace, ViewDefaults, Workspace},
};

fn torrent(id: &str, size: i64) -> Record {
    Record::new(
        id,
        attributes([("name", Value::from(id)), ("size", Value::Int(size))]),
    )
}

fn peer(id: &str, torrent: &str, downloaded: i64) -> Record {
    Record::new(
        id,
        attributes([
            ("torrent", Value::from(torrent)),
            ("address", Value::from(id)),
            ("torrent-progress-bytes", Value::Int(downloaded)),
        ]),
    )
}

fn snapshot(at: Instant, kind: EntityKind, records: Vec<Record>) -> Batch {
    Batch::new(at).with(Update::Snapshot { kind, records })
}

fn row_ids(ws: &mut Workspace) -> Vec<String> {
    let view = ws.current_view().unwrap();
    view.rows.iter().map(|e| e.id.to_string()).collect()
}

fn run(ws: &mut Workspace, text: &str) -> Effect {
    let outcome = ws.execute(&text.parse().unwrap());
    if let Some(notice) = &outcome.notice {
        println!("{text}: {}", notice.text);
    }
    outcome.effect
}

#[test]
fn sort_filter_and_eviction_keep_focus_on_survivor() {
    let mut ws = Workspace::new(ViewDefaults::default());
    let t0 = Instant::now();
    ws.apply(snapshot(
        t0,
        EntityKind::Torrent,
        vec![torrent("A", 10), torrent("B", 5), torrent("C", 10)],
    ));

    run(&mut ws, "sort !size");
    assert_eq!(row_ids(&mut ws), ["A", "C", "B"]);

    run(&mut ws, "filter size>=10");
    assert_eq!(row_ids(&mut ws), ["A", "C"]);
    assert_eq!(ws.focused().map(|e| e.id), Some(EntityId::from("A")));

    ws.apply(snapshot(
        t0 + Duration::from_secs(1),
        EntityKind::Torrent,
        vec![torrent("B", 5), torrent("C", 10)],
    ));
    assert_eq!(row_ids(&mut ws), ["C"]);
    assert_eq!(ws.focused().map(|e| e.id), Some(EntityId::from("C")));
}

#[test]
fn peer_tab_follows_its_torrent() {
    let mut ws = Workspace::new(ViewDefaults::default());
    let t0 = Instant::now();
    ws.apply(
        snapshot(t0, EntityKind::Torrent, vec![torrent("1", 10), torrent("2", 20)]).with(
            Update::Snapshot {
                kind: EntityKind::Peer,
                records: vec![peer("1:a", "1", 0), peer("1:b", "1", 0), peer("2:a", "2", 0)],
            },
        ),
    );

    run(&mut ws, "open peers");
    let view = ws.current_view().unwrap();
    assert_eq!(view.kind, EntityKind::Peer);
    assert_eq!(view.title, "peers: 1");
    assert_eq!(row_ids(&mut ws), ["1:a", "1:b"]);

    // Peer 1:a reported 1000 more bytes one second later.
    ws.apply(snapshot(
        t0 + Duration::from_secs(1),
        EntityKind::Peer,
        vec![peer("1:a", "1", 1000), peer("1:b", "1", 0), peer("2:a", "2", 0)],
    ));
    let rate = ws
        .registry()
        .get(EntityKind::Peer, &EntityId::from("1:a"))
        .and_then(|e| e.number("rate-est"))
        .unwrap();
    assert!(rate > 0.0);

    ws.apply(snapshot(
        t0 + Duration::from_secs(2),
        EntityKind::Torrent,
        vec![torrent("2", 20)],
    ));
    assert!(row_ids(&mut ws).is_empty());
    assert_eq!(ws.registry().len(EntityKind::Peer), 1);
}

#[test]
fn control_commands_request_remote_actions() {
    let mut ws = Workspace::new(ViewDefaults::default());
    ws.apply(snapshot(
        Instant::now(),
        EntityKind::Torrent,
        vec![torrent("7", 1)],
    ));
    assert_eq!(
        run(&mut ws, "stop"),
        Effect::Remote(RemoteAction::Stop(vec![EntityId::from("7")]))
    );
    assert_eq!(
        run(&mut ws, "remove --delete-files"),
        Effect::Remote(RemoteAction::Remove {
            ids: vec![EntityId::from("7")],
            delete_data: true,
        })
    );

    run(&mut ws, "open files");
    assert_eq!(run(&mut ws, "start"), Effect::None);
}

struct Growing {
    polls: Mutex<i64>,
}

impl DaemonSource for Growing {
    fn kinds(&self) -> &[EntityKind] {
        &[EntityKind::Torrent]
    }

    fn fetch(&self, observed_at: Instant) -> Result<Batch, SourceError> {
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        let records = (0..*polls % 7)
            .map(|i| torrent(&format!("t{i}"), i * 3 % 5))
            .collect();
        Ok(snapshot(observed_at, EntityKind::Torrent, records))
    }

    fn perform(&self, _: &RemoteAction) -> Result<(), SourceError> {
        Ok(())
    }
}

#[test]
fn polling_and_view_changes_interleave_safely() {
    let mut workspace = Workspace::new(ViewDefaults::default());
    workspace.attach(&[EntityKind::Torrent]).unwrap();
    let shared: SharedWorkspace = Arc::new(Mutex::new(workspace));
    let source = Arc::new(Growing {
        polls: Mutex::new(0),
    });

    let poller = {
        let shared = Arc::clone(&shared);
        let source = Arc::clone(&source);
        thread::spawn(move || {
            for _ in 0..200 {
                poll_once(source.as_ref(), &shared).unwrap();
            }
        })
    };

    let commands = ["sort !size", "filter size>=2", "filter --pop", "sort name", "move 1"];
    for text in commands.iter().cycle().take(200) {
        let mut ws = lock(&shared);
        ws.execute(&text.parse().unwrap());
        let view = ws.current_view().unwrap();
        if let Some(focus) = view.focus {
            assert!(focus < view.rows.len());
        }
        for row in &view.rows {
            assert!(ws.registry().contains(EntityKind::Torrent, &row.id));
        }
    }
    poller.join().unwrap();

    let ws = lock(&shared);
    assert!(ws.registry().len(EntityKind::Torrent) < 7);
}

#[test]
fn missing_peer_support_disables_peer_lists() {
    let mut ws = Workspace::new(ViewDefaults::default());
    ws.attach(&[EntityKind::Torrent]).unwrap();
    ws.apply(snapshot(Instant::now(), EntityKind::Torrent, vec![torrent("1", 1)]));
    run(&mut ws, "open peers");
    assert_eq!(ws.current_kind(), EntityKind::Torrent);
    assert_eq!(ws.tabs().depth(), 1);
}
