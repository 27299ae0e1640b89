use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Instant,
};

use anyhow::Result;
use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::{
    config::RpcConfig,
    error::SourceError,
    model::{Attributes, EntityId, EntityKind, Value},
    source::{DaemonSource, RemoteAction},
    sync::{Batch, Record, Update},
};

#[derive(Debug, Error)]
pub enum TransmissionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed")]
    Authentication,
    #[error("session negotiation failed")]
    Session,
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("not a torrent id: {0}")]
    InvalidId(EntityId),
}

impl From<TransmissionError> for SourceError {
    fn from(err: TransmissionError) -> Self {
        SourceError::Daemon(Box::new(err))
    }
}

pub type RpcResult<T> = std::result::Result<T, TransmissionError>;

const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "status",
    "error",
    "errorString",
    "percentDone",
    "eta",
    "uploadRatio",
    "sizeWhenDone",
    "downloadedEver",
    "uploadedEver",
    "downloadDir",
    "peersConnected",
    "addedDate",
    "peers",
    "trackerStats",
    "files",
    "fileStats",
];

pub struct TransmissionClient {
    http: Client,
    endpoint: String,
    auth: Option<(String, Option<String>)>,
    session_id: Mutex<Option<String>>,
    counter: AtomicU64,
}

impl TransmissionClient {
    pub fn new(config: RpcConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let RpcConfig {
            username,
            password,
            timeout,
            verify_ssl,
            user_agent,
            ..
        } = config;
        let mut builder = Client::builder().timeout(timeout).user_agent(user_agent);
        if !verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        let auth = username.map(|user| (user, password));
        Ok(Self {
            http,
            endpoint,
            auth,
            session_id: Mutex::new(None),
            counter: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn daemon_version(&self) -> RpcResult<String> {
        let session: SessionInfo = self.call("session-get", Some(json!({"fields": ["version"]})))?;
        Ok(session.version.unwrap_or_else(|| "unknown".to_string()))
    }

    pub fn fetch_batch(&self, observed_at: Instant) -> RpcResult<Batch> {
        let response: TorrentGetResponse =
            self.call("torrent-get", Some(json!({"fields": TORRENT_FIELDS})))?;
        Ok(batch_from_torrents(observed_at, response.torrents))
    }

    pub fn remove_torrents(&self, ids: &[i64], delete_local_data: bool) -> RpcResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let args = json!({
            "ids": ids,
            "delete-local-data": delete_local_data,
        });
        self.call_raw("torrent-remove", Some(args))?;
        Ok(())
    }

    pub fn start_torrents(&self, ids: &[i64]) -> RpcResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let args = json!({ "ids": ids });
        self.call_raw("torrent-start", Some(args))?;
        Ok(())
    }

    pub fn stop_torrents(&self, ids: &[i64]) -> RpcResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let args = json!({ "ids": ids });
        self.call_raw("torrent-stop", Some(args))?;
        Ok(())
    }

    fn call<T>(&self, method: &str, arguments: Option<Json>) -> RpcResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self.call_raw(method, arguments)?;
        serde_json::from_value(value).map_err(TransmissionError::from)
    }

    fn call_raw(&self, method: &str, arguments: Option<Json>) -> RpcResult<Json> {
        let payload = RpcRequest {
            method,
            arguments,
            tag: self.counter.fetch_add(1, Ordering::Relaxed),
        };
        loop {
            let mut request = self
                .http
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .json(&payload);
            if let Some((user, pass)) = &self.auth {
                request = request.basic_auth(user, pass.as_ref());
            }
            let session_header = match self.session_id.lock() {
                Ok(guard) => (*guard).clone(),
                Err(_) => None,
            };
            if let Some(session) = session_header {
                request = request.header("X-Transmission-Session-Id", session);
            }
            let response = request.send()?;
            match response.status() {
                StatusCode::CONFLICT => {
                    if let Some(id) = response.headers().get("X-Transmission-Session-Id") {
                        let value = id
                            .to_str()
                            .map_err(|_| TransmissionError::Session)?
                            .to_string();
                        if let Ok(mut guard) = self.session_id.lock() {
                            *guard = Some(value);
                        }
                        continue;
                    }
                    return Err(TransmissionError::Session);
                }
                StatusCode::UNAUTHORIZED => return Err(TransmissionError::Authentication),
                status if !status.is_success() => {
                    return Err(TransmissionError::HttpStatus(status));
                }
                _ => {
                    let body: RpcResponse = response.json()?;
                    if body.result != "success" {
                        return Err(TransmissionError::Rpc(body.result));
                    }
                    return Ok(body.arguments.unwrap_or(Json::Null));
                }
            }
        }
    }
}

impl DaemonSource for TransmissionClient {
    fn kinds(&self) -> &[EntityKind] {
        &EntityKind::ALL
    }

    fn fetch(&self, observed_at: Instant) -> std::result::Result<Batch, SourceError> {
        Ok(self.fetch_batch(observed_at)?)
    }

    fn perform(&self, action: &RemoteAction) -> std::result::Result<(), SourceError> {
        let ids = action
            .ids()
            .iter()
            .map(|id| {
                id.as_str()
                    .parse::<i64>()
                    .map_err(|_| TransmissionError::InvalidId(id.clone()))
            })
            .collect::<RpcResult<Vec<i64>>>()?;
        match action {
            RemoteAction::Start(_) => self.start_torrents(&ids)?,
            RemoteAction::Stop(_) => self.stop_torrents(&ids)?,
            RemoteAction::Remove { delete_data, .. } => self.remove_torrents(&ids, *delete_data)?,
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Json>,
    tag: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    arguments: Option<Json>,
    result: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TorrentGetResponse {
    #[serde(default)]
    torrents: Vec<TorrentWire>,
}

#[derive(Debug, Deserialize)]
struct TorrentWire {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    error: i64,
    #[serde(default, alias = "errorString")]
    error_string: String,
    #[serde(default, alias = "percentDone")]
    percent_done: f64,
    #[serde(default)]
    eta: i64,
    #[serde(default, alias = "uploadRatio")]
    upload_ratio: f64,
    #[serde(default, alias = "sizeWhenDone")]
    size_when_done: i64,
    #[serde(default, alias = "downloadedEver")]
    downloaded_ever: i64,
    #[serde(default, alias = "uploadedEver")]
    uploaded_ever: i64,
    #[serde(default, alias = "downloadDir")]
    download_dir: String,
    #[serde(default, alias = "peersConnected")]
    peers_connected: i64,
    #[serde(default, alias = "addedDate")]
    added_date: i64,
    #[serde(default)]
    peers: Vec<PeerWire>,
    #[serde(default, alias = "trackerStats")]
    tracker_stats: Vec<TrackerWire>,
    #[serde(default)]
    files: Vec<FileWire>,
    #[serde(default, alias = "fileStats")]
    file_stats: Vec<FileStatWire>,
}

#[derive(Debug, Deserialize)]
struct PeerWire {
    address: String,
    #[serde(default)]
    port: i64,
    #[serde(default, alias = "clientName")]
    client_name: String,
    #[serde(default)]
    progress: f64,
    #[serde(default, alias = "rateToClient")]
    rate_to_client: i64,
    #[serde(default, alias = "rateToPeer")]
    rate_to_peer: i64,
}

#[derive(Debug, Deserialize)]
struct TrackerWire {
    id: i64,
    announce: String,
    #[serde(default, alias = "announceState")]
    announce_state: i64,
    #[serde(default, alias = "seederCount")]
    seeder_count: i64,
    #[serde(default, alias = "leecherCount")]
    leecher_count: i64,
    #[serde(default, alias = "lastAnnounceTime")]
    last_announce_time: i64,
}

#[derive(Debug, Deserialize)]
struct FileWire {
    name: String,
    #[serde(default)]
    length: i64,
    #[serde(default, alias = "bytesCompleted")]
    bytes_completed: i64,
}

#[derive(Debug, Deserialize)]
struct FileStatWire {
    #[serde(default = "wanted_by_default")]
    wanted: bool,
    #[serde(default)]
    priority: i64,
}

fn wanted_by_default() -> bool {
    true
}

/// One snapshot per kind; children of all torrents share their kind's snapshot.
fn batch_from_torrents(observed_at: Instant, torrents: Vec<TorrentWire>) -> Batch {
    let mut torrent_records = Vec::with_capacity(torrents.len());
    let mut peers = Vec::new();
    let mut trackers = Vec::new();
    let mut files = Vec::new();

    for wire in torrents {
        let tid = wire.id.to_string();
        for peer in &wire.peers {
            peers.push(peer_record(&tid, wire.size_when_done, peer));
        }
        for tracker in &wire.tracker_stats {
            trackers.push(tracker_record(&tid, tracker));
        }
        for (index, file) in wire.files.iter().enumerate() {
            files.push(file_record(&tid, index, file, wire.file_stats.get(index)));
        }
        torrent_records.push(torrent_record(wire));
    }

    Batch::new(observed_at)
        .with(Update::Snapshot {
            kind: EntityKind::Torrent,
            records: torrent_records,
        })
        .with(Update::Snapshot {
            kind: EntityKind::Peer,
            records: peers,
        })
        .with(Update::Snapshot {
            kind: EntityKind::Tracker,
            records: trackers,
        })
        .with(Update::Snapshot {
            kind: EntityKind::File,
            records: files,
        })
}

fn torrent_status(wire: &TorrentWire) -> String {
    let status = match wire.status {
        0 => "stopped",
        1 => "check-wait",
        2 => "checking",
        3 => "download-wait",
        4 => "downloading",
        5 => "seed-wait",
        6 => "seeding",
        other => return format!("status-{other}"),
    };
    // Tracker error with no peers to fall back on.
    if status != "stopped" && wire.error == 2 && wire.peers_connected == 0 {
        return "isolated".to_string();
    }
    status.to_string()
}

fn torrent_record(wire: TorrentWire) -> Record {
    let mut attrs = Attributes::new();
    attrs.insert("status".into(), Value::Text(torrent_status(&wire)));
    attrs.insert("name".into(), Value::Text(wire.name));
    attrs.insert("size".into(), Value::Int(wire.size_when_done));
    attrs.insert("downloaded".into(), Value::Int(wire.downloaded_ever));
    attrs.insert("uploaded".into(), Value::Int(wire.uploaded_ever));
    attrs.insert("progress".into(), Value::Float(wire.percent_done * 100.0));
    if wire.upload_ratio >= 0.0 {
        attrs.insert("ratio".into(), Value::Float(wire.upload_ratio));
    }
    if wire.eta >= 0 {
        attrs.insert("eta".into(), Value::Int(wire.eta));
    }
    attrs.insert("peers".into(), Value::Int(wire.peers_connected));
    let seeds = wire
        .tracker_stats
        .iter()
        .map(|tracker| tracker.seeder_count)
        .max()
        .unwrap_or(0)
        .max(0);
    attrs.insert("seeds".into(), Value::Int(seeds));
    attrs.insert("dir".into(), Value::Text(wire.download_dir));
    if let Some(tracker) = wire.tracker_stats.first() {
        attrs.insert("tracker".into(), Value::Text(host_of(&tracker.announce)));
    }
    attrs.insert("error".into(), Value::Text(wire.error_string));
    attrs.insert("added".into(), Value::Time(wire.added_date));
    Record::new(wire.id, attrs)
}

fn peer_record(tid: &str, torrent_size: i64, wire: &PeerWire) -> Record {
    let address = format!("{}:{}", wire.address, wire.port);
    let progress_bytes = (wire.progress.clamp(0.0, 1.0) * torrent_size.max(0) as f64) as i64;
    let attrs = Attributes::from([
        ("torrent".to_string(), Value::from(tid)),
        ("address".to_string(), Value::Text(address.clone())),
        ("client".to_string(), Value::Text(wire.client_name.clone())),
        ("progress".to_string(), Value::Float(wire.progress * 100.0)),
        ("rate-down".to_string(), Value::Int(wire.rate_to_client)),
        ("rate-up".to_string(), Value::Int(wire.rate_to_peer)),
        ("torrent-progress-bytes".to_string(), Value::Int(progress_bytes)),
    ]);
    Record::new(format!("{tid}:{address}"), attrs)
}

fn tracker_record(tid: &str, wire: &TrackerWire) -> Record {
    let status = match wire.announce_state {
        1 => "waiting",
        2 => "queued",
        3 => "announcing",
        _ => "inactive",
    };
    let attrs = Attributes::from([
        ("torrent".to_string(), Value::from(tid)),
        ("url".to_string(), Value::Text(wire.announce.clone())),
        ("status".to_string(), Value::from(status)),
        ("seeds".to_string(), Value::Int(wire.seeder_count)),
        ("leeches".to_string(), Value::Int(wire.leecher_count)),
        ("last-announce".to_string(), Value::Time(wire.last_announce_time)),
    ]);
    Record::new(format!("{tid}:{}", wire.id), attrs)
}

fn file_record(tid: &str, index: usize, wire: &FileWire, stat: Option<&FileStatWire>) -> Record {
    let progress = if wire.length > 0 {
        wire.bytes_completed as f64 / wire.length as f64 * 100.0
    } else {
        100.0
    };
    let priority = match stat {
        Some(stat) if !stat.wanted => "shun",
        Some(stat) if stat.priority > 0 => "high",
        Some(stat) if stat.priority < 0 => "low",
        _ => "normal",
    };
    let attrs = Attributes::from([
        ("torrent".to_string(), Value::from(tid)),
        ("name".to_string(), Value::Text(wire.name.clone())),
        ("size".to_string(), Value::Int(wire.length)),
        ("downloaded".to_string(), Value::Int(wire.bytes_completed)),
        ("progress".to_string(), Value::Float(progress)),
        ("priority".to_string(), Value::from(priority)),
    ]);
    Record::new(format!("{tid}/{index}"), attrs)
}

fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', ':']).next().unwrap_or(rest).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<TorrentWire> {
        let response: TorrentGetResponse = serde_json::from_value(json!({
            "torrents": [{
                "id": 7,
                "name": "debian.iso",
                "status": 4,
                "error": 0,
                "errorString": "",
                "percentDone": 0.25,
                "eta": 120,
                "uploadRatio": -1,
                "sizeWhenDone": 4000,
                "downloadedEver": 1000,
                "uploadedEver": 0,
                "downloadDir": "/srv",
                "peersConnected": 1,
                "addedDate": 1700000000,
                "peers": [{
                    "address": "10.0.0.2",
                    "port": 51413,
                    "clientName": "qBittorrent",
                    "progress": 0.5,
                    "rateToClient": 300,
                    "rateToPeer": 0
                }],
                "trackerStats": [{
                    "id": 0,
                    "announce": "udp://tracker.example.org:6969/announce",
                    "announceState": 1,
                    "seederCount": 12,
                    "leecherCount": 3,
                    "lastAnnounceTime": 1700000100
                }],
                "files": [
                    {"name": "debian.iso", "length": 3000, "bytesCompleted": 750},
                    {"name": "SHA256SUMS", "length": 0, "bytesCompleted": 0}
                ],
                "fileStats": [
                    {"wanted": true, "priority": 1},
                    {"wanted": false, "priority": 0}
                ]
            }]
        }))
        .unwrap();
        response.torrents
    }

    fn records(batch: &Batch, kind: EntityKind) -> &[Record] {
        batch
            .updates
            .iter()
            .find_map(|update| match update {
                Update::Snapshot { kind: k, records } if *k == kind => Some(records.as_slice()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn converts_torrent_get_response() {
        let batch = batch_from_torrents(Instant::now(), fixture());
        assert_eq!(batch.updates.len(), 4);

        let torrent = &records(&batch, EntityKind::Torrent)[0];
        assert_eq!(torrent.id, EntityId::from("7"));
        assert_eq!(torrent.attributes["status"], Value::from("downloading"));
        assert_eq!(torrent.attributes["progress"], Value::Float(25.0));
        assert_eq!(torrent.attributes["seeds"], Value::Int(12));
        assert_eq!(torrent.attributes["tracker"], Value::from("tracker.example.org"));
        assert!(!torrent.attributes.contains_key("ratio"));

        let peer = &records(&batch, EntityKind::Peer)[0];
        assert_eq!(peer.id, EntityId::from("7:10.0.0.2:51413"));
        assert_eq!(peer.attributes["torrent-progress-bytes"], Value::Int(2000));
        assert_eq!(peer.attributes["rate-down"], Value::Int(300));

        let tracker = &records(&batch, EntityKind::Tracker)[0];
        assert_eq!(tracker.attributes["status"], Value::from("waiting"));

        let files = records(&batch, EntityKind::File);
        assert_eq!(files[0].attributes["priority"], Value::from("high"));
        assert_eq!(files[0].attributes["progress"], Value::Float(25.0));
        assert_eq!(files[1].id, EntityId::from("7/1"));
        assert_eq!(files[1].attributes["priority"], Value::from("shun"));
    }

    #[test]
    fn finished_torrent_loses_its_eta() {
        use std::time::Duration;

        use crate::{rate::RateEstimator, registry::Registry, sync};

        let mut registry = Registry::new();
        let mut rates = RateEstimator::default();
        let t0 = Instant::now();
        let mut torrents = fixture();
        torrents[0].upload_ratio = 0.5;
        sync::apply(&mut registry, &mut rates, batch_from_torrents(t0, torrents));

        let mut torrents = fixture();
        torrents[0].eta = -1;
        torrents[0].upload_ratio = -1.0;
        torrents[0].tracker_stats.clear();
        sync::apply(
            &mut registry,
            &mut rates,
            batch_from_torrents(t0 + Duration::from_secs(1), torrents),
        );

        let torrent = registry.get(EntityKind::Torrent, &"7".into()).unwrap();
        assert!(torrent.get("eta").is_none());
        assert!(torrent.get("ratio").is_none());
        assert!(torrent.get("tracker").is_none());
        assert!(torrent.get("rate-down").is_some());
        assert_eq!(torrent.text("name"), Some("debian.iso"));
    }

    #[test]
    fn tracker_error_without_peers_is_isolated() {
        let mut torrents = fixture();
        torrents[0].error = 2;
        torrents[0].peers_connected = 0;
        assert_eq!(torrent_status(&torrents[0]), "isolated");
        torrents[0].status = 0;
        assert_eq!(torrent_status(&torrents[0]), "stopped");
    }

    #[test]
    fn extracts_tracker_host() {
        assert_eq!(host_of("https://t.example.net/announce"), "t.example.net");
        assert_eq!(host_of("udp://t.example.net:80"), "t.example.net");
        assert_eq!(host_of("t.example.net"), "t.example.net");
    }
}
