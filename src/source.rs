//! The seam between the workspace and whatever produces entity updates.

use std::{fmt, time::Instant};

use log::debug;

use crate::{
    error::SourceError,
    model::{EntityId, EntityKind},
    sync::{Batch, SyncReport},
    workspace::{lock, SharedWorkspace},
};

/// Requests the daemon acts on; the next poll shows their effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    Start(Vec<EntityId>),
    Stop(Vec<EntityId>),
    Remove {
        ids: Vec<EntityId>,
        delete_data: bool,
    },
}

impl RemoteAction {
    pub fn ids(&self) -> &[EntityId] {
        match self {
            RemoteAction::Start(ids) | RemoteAction::Stop(ids) => ids,
            RemoteAction::Remove { ids, .. } => ids,
        }
    }
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            RemoteAction::Start(_) => "start",
            RemoteAction::Stop(_) => "stop",
            RemoteAction::Remove {
                delete_data: false, ..
            } => "remove",
            RemoteAction::Remove {
                delete_data: true, ..
            } => "remove (with data)",
        };
        match self.ids() {
            [id] => write!(f, "{verb} torrent {id}"),
            ids => write!(f, "{verb} {} torrents", ids.len()),
        }
    }
}

/// A daemon that reports entities and accepts control requests.
pub trait DaemonSource: Send {
    /// Entity kinds this source reports. Must include torrents.
    fn kinds(&self) -> &[EntityKind];

    /// Fetches the current state, stamped with `observed_at`.
    fn fetch(&self, observed_at: Instant) -> Result<Batch, SourceError>;

    fn perform(&self, action: &RemoteAction) -> Result<(), SourceError>;
}

/// Fetches outside the lock, then applies the whole batch under it.
pub fn poll_once<S>(source: &S, workspace: &SharedWorkspace) -> Result<SyncReport, SourceError>
where
    S: DaemonSource + ?Sized,
{
    let batch = source.fetch(Instant::now())?;
    let report = lock(workspace).apply(batch);
    for warning in &report.warnings {
        debug!("sync: {warning}");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        model::{attributes, Value},
        sync::{Record, Update},
        workspace::{ViewDefaults, Workspace},
    };

    struct Fixed(Vec<Record>);

    impl DaemonSource for Fixed {
        fn kinds(&self) -> &[EntityKind] {
            &[EntityKind::Torrent]
        }

        fn fetch(&self, observed_at: Instant) -> Result<Batch, SourceError> {
            Ok(Batch::new(observed_at).with(Update::Snapshot {
                kind: EntityKind::Torrent,
                records: self.0.clone(),
            }))
        }

        fn perform(&self, _: &RemoteAction) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[test]
    fn poll_applies_batch_to_shared_workspace() {
        let source = Fixed(vec![Record::new(
            "1",
            attributes([("name", Value::from("debian"))]),
        )]);
        let workspace = Arc::new(Mutex::new(Workspace::new(ViewDefaults::default())));
        let report = poll_once(&source, &workspace).unwrap();
        assert_eq!(report.count(EntityKind::Torrent), 1);
        assert_eq!(lock(&workspace).registry().len(EntityKind::Torrent), 1);
    }

    #[test]
    fn describes_actions() {
        assert_eq!(RemoteAction::Start(vec!["3".into()]).to_string(), "start torrent 3");
        let remove = RemoteAction::Remove {
            ids: vec!["1".into(), "2".into()],
            delete_data: true,
        };
        assert_eq!(remove.to_string(), "remove (with data) 2 torrents");
    }
}
