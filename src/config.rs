use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use dirs::config_dir;
use log::LevelFilter;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac, OneOrMany};

use crate::{
    command::Command,
    dispatch::{bind_all, default_keymap, DEFAULT_CHAIN_TIMEOUT},
    error::ConfigError,
    filter::Filter,
    keymap::KeyMap,
    model::EntityKind,
    sort::SortSpec,
    workspace::ViewDefaults,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub poll_interval: Duration,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub views: ViewDefaults,
    pub chain_timeout: Duration,
    pub keymap: KeyMap<Command>,
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub verify_ssl: bool,
    pub user_agent: String,
    pub url: Option<String>,
}

impl RpcConfig {
    pub fn endpoint(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let mut path = self.path.clone();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, path)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tabbed terminal dashboard for the Transmission daemon", long_about = None)]
pub struct Cli {
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub timeout: Option<f64>,
    #[arg(long)]
    pub poll_interval: Option<f64>,
    #[arg(long, action = ArgAction::SetTrue)]
    pub tls: bool,
    #[arg(long = "no-tls", action = ArgAction::SetTrue)]
    pub no_tls: bool,
    #[arg(long)]
    pub insecure: bool,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Write log records to this file while the dashboard is running.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    rpc: Option<FileRpcConfig>,
    poll_interval: Option<f64>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    views: Option<FileViewsConfig>,
    #[serde(default)]
    keys: Vec<FileKeyBinding>,
}

#[derive(Debug, Default, Deserialize)]
struct FileRpcConfig {
    url: Option<String>,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<f64>,
    tls: Option<bool>,
    verify_ssl: Option<bool>,
    user_agent: Option<String>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct FileViewsConfig {
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    chain_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    rate_time_constant: Option<Duration>,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    rate_stale_after: Option<Duration>,
    max_tabs: Option<usize>,
    /// Default sort per kind, e.g. `torrents = "!rate-down name"`.
    #[serde(default)]
    sort: BTreeMap<String, String>,
    /// Default filters per kind; one expression or a list.
    #[serde_as(as = "BTreeMap<_, OneOrMany<_>>")]
    #[serde(default)]
    filter: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FileKeyBinding {
    key: String,
    action: String,
    context: Option<String>,
}

pub fn build_config(cli: &Cli) -> Result<AppConfig> {
    let file_config = load_file_config(cli.config.as_deref())?;
    let rpc_file = file_config.as_ref().and_then(|cfg| cfg.rpc.as_ref());

    let url = cli
        .url
        .clone()
        .or_else(|| env::var("TRANSMISSION_URL").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.url.clone()));

    let host = cli
        .host
        .clone()
        .or_else(|| env::var("TRANSMISSION_HOST").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.host.clone()))
        .unwrap_or_else(|| "localhost".to_string());

    let port = cli
        .port
        .or_else(|| env_var_parse("TRANSMISSION_PORT"))
        .or_else(|| rpc_file.and_then(|cfg| cfg.port))
        .unwrap_or(9091);

    let path = cli
        .path
        .clone()
        .or_else(|| env::var("TRANSMISSION_RPC_PATH").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.path.clone()))
        .unwrap_or_else(|| "/transmission/rpc".to_string());

    let username = cli
        .username
        .clone()
        .or_else(|| env::var("TRANSMISSION_USERNAME").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.username.clone()));

    let password = cli
        .password
        .clone()
        .or_else(|| env::var("TRANSMISSION_PASSWORD").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.password.clone()));

    let timeout_secs = cli
        .timeout
        .or_else(|| env_float("TRANSMISSION_TIMEOUT"))
        .or_else(|| rpc_file.and_then(|cfg| cfg.timeout))
        .unwrap_or(10.0);

    if timeout_secs <= 0.0 {
        anyhow::bail!("timeout must be positive");
    }

    let poll_secs = cli
        .poll_interval
        .or_else(|| env_float("TRANSMISSION_POLL_INTERVAL"))
        .or_else(|| file_config.as_ref().and_then(|cfg| cfg.poll_interval))
        .unwrap_or(3.0);

    if poll_secs < 0.0 {
        anyhow::bail!("poll interval cannot be negative");
    }

    let tls_flag = if cli.tls {
        Some(true)
    } else if cli.no_tls {
        Some(false)
    } else {
        None
    };

    let use_tls = tls_flag
        .or(env_bool("TRANSMISSION_TLS"))
        .or_else(|| rpc_file.and_then(|cfg| cfg.tls))
        .unwrap_or(false);

    let mut verify_ssl = rpc_file.and_then(|cfg| cfg.verify_ssl).unwrap_or(true);
    if let Some(value) = env_bool("TRANSMISSION_VERIFY_SSL") {
        verify_ssl = value;
    }
    if cli.insecure {
        verify_ssl = false;
    }

    let scheme = rpc_file
        .and_then(|cfg| cfg.scheme.clone())
        .unwrap_or_else(|| if use_tls { "https" } else { "http" }.to_string());

    let user_agent = env::var("TRANSMISSION_USER_AGENT")
        .ok()
        .or_else(|| rpc_file.and_then(|cfg| cfg.user_agent.clone()))
        .unwrap_or_else(|| "transmission-dashboard".to_string());

    let log_level_str = cli
        .log_level
        .clone()
        .or_else(|| env::var("TRANSMISSION_LOG_LEVEL").ok())
        .or_else(|| file_config.as_ref().and_then(|cfg| cfg.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let log_level = LevelFilter::from_str(&log_level_str).unwrap_or(LevelFilter::Info);

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| env::var_os("TRANSMISSION_LOG_FILE").map(PathBuf::from))
        .or_else(|| file_config.as_ref().and_then(|cfg| cfg.log_file.clone()));

    let views_file = file_config.as_ref().and_then(|cfg| cfg.views.as_ref());
    let views = build_views(views_file).context("invalid [views] configuration")?;
    let chain_timeout = views_file
        .and_then(|cfg| cfg.chain_timeout)
        .unwrap_or(DEFAULT_CHAIN_TIMEOUT);
    let keys = file_config.as_ref().map_or(&[][..], |cfg| cfg.keys.as_slice());
    let keymap = build_keymap(keys).context("invalid [[keys]] configuration")?;

    Ok(AppConfig {
        rpc: RpcConfig {
            scheme,
            host,
            port,
            path,
            username,
            password,
            timeout: Duration::from_secs_f64(timeout_secs),
            verify_ssl,
            user_agent,
            url,
        },
        poll_interval: Duration::from_secs_f64(poll_secs.max(0.0)),
        log_level,
        log_file,
        views,
        chain_timeout,
        keymap,
    })
}

fn build_views(file: Option<&FileViewsConfig>) -> Result<ViewDefaults, ConfigError> {
    let mut views = ViewDefaults::default();
    let Some(file) = file else {
        return Ok(views);
    };
    if let Some(max) = file.max_tabs {
        if max == 0 {
            return Err(ConfigError::Invalid("max_tabs must be at least 1".into()));
        }
        views.max_tabs = max;
    }
    if let Some(tau) = file.rate_time_constant {
        if tau.is_zero() {
            return Err(ConfigError::Invalid("rate_time_constant must be positive".into()));
        }
        views.rate_time_constant = tau;
    }
    if let Some(stale) = file.rate_stale_after {
        views.rate_stale_after = stale;
    }
    for (name, keys) in &file.sort {
        let kind = parse_kind(name)?;
        let spec = SortSpec::parse(kind, keys).map_err(|source| ConfigError::Sort { kind, source })?;
        views.sorts.insert(kind, spec);
    }
    for (name, expressions) in &file.filter {
        let kind = parse_kind(name)?;
        let filters = expressions
            .iter()
            .map(|text| Filter::parse(kind, text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ConfigError::Filter { kind, source })?;
        views.filters.insert(kind, filters);
    }
    Ok(views)
}

fn parse_kind(name: &str) -> Result<EntityKind, ConfigError> {
    name.parse()
        .map_err(|_| ConfigError::Invalid(format!("unknown list kind {name:?}")))
}

fn build_keymap(bindings: &[FileKeyBinding]) -> Result<KeyMap<Command>, ConfigError> {
    let mut keymap = default_keymap()?;
    bind_all(
        &mut keymap,
        bindings
            .iter()
            .map(|b| (b.key.as_str(), b.context.as_deref(), b.action.as_str())),
    )?;
    Ok(keymap)
}

fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = path {
        return read_file_config(path);
    }

    if let Ok(env_path) = env::var("TRANSMISSION_DASHBOARD_CONFIG") {
        return read_file_config(Path::new(&env_path));
    }

    if let Some(dir) = config_dir() {
        let path = dir.join("transmission-dashboard").join("config.toml");
        return read_file_config(&path);
    }

    Ok(None)
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(parsed))
}

fn env_var_parse<T>(name: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(name).ok().and_then(|value| value.parse().ok())
}

fn env_float(name: &str) -> Option<f64> {
    env_var_parse(name)
}

fn env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .and_then(|value| match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::keymap::{Context as KeyContext, KeyChain};

    fn parse(text: &str) -> FileConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn reads_views_and_keys() {
        let config = parse(
            r#"
            poll_interval = 1.5

            [views]
            chain_timeout = 0.5
            max_tabs = 4

            [views.sort]
            torrents = "!rate-down name"

            [views.filter]
            torrents = "!paused"
            peers = ["rate-down > 0", "address ~ 10."]

            [[keys]]
            key = "ctrl-p"
            action = "open peers"
            context = "torrent"
            "#,
        );
        let views = config.views.as_ref().unwrap();
        assert_eq!(views.chain_timeout, Some(Duration::from_millis(500)));

        let defaults = build_views(Some(views)).unwrap();
        assert_eq!(defaults.max_tabs, 4);
        assert_eq!(defaults.sort(EntityKind::Torrent).to_string(), "!rate-down name");
        assert_eq!(defaults.filters(EntityKind::Torrent).len(), 1);
        assert_eq!(defaults.filters(EntityKind::Peer).len(), 2);

        let keymap = build_keymap(&config.keys).unwrap();
        let chain: KeyChain = "ctrl-p".parse().unwrap();
        assert!(keymap
            .get(&chain, Some(KeyContext::List(EntityKind::Torrent)))
            .is_some());
    }

    #[test]
    fn rejects_invalid_defaults() {
        let config = parse("[views.sort]\npeers = \"ratio\"\n");
        assert!(matches!(
            build_views(config.views.as_ref()),
            Err(ConfigError::Sort { kind: EntityKind::Peer, .. })
        ));

        let config = parse("[views.filter]\nfiles = \"status = seeding\"\n");
        assert!(matches!(
            build_views(config.views.as_ref()),
            Err(ConfigError::Filter { kind: EntityKind::File, .. })
        ));

        let config = parse("[views.sort]\nwidgets = \"name\"\n");
        assert!(matches!(
            build_views(config.views.as_ref()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bindings_for_missing_capabilities() {
        let config = parse(
            "[[keys]]\nkey = \"p\"\naction = \"open peers\"\ncontext = \"file\"\n",
        );
        assert!(matches!(
            build_keymap(&config.keys),
            Err(ConfigError::Action { .. })
        ));
    }

    #[test]
    fn empty_action_unbinds_default() {
        let config = parse("[[keys]]\nkey = \"q\"\naction = \"\"\ncontext = \"main\"\n");
        let keymap = build_keymap(&config.keys).unwrap();
        let chain: KeyChain = "q".parse().unwrap();
        assert!(keymap.get(&chain, Some(KeyContext::Main)).is_none());
    }

    #[test]
    fn reads_config_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_file = \"/tmp/dashboard.log\"\n[rpc]\nport = 9092").unwrap();
        let config = read_file_config(file.path()).unwrap().unwrap();
        assert_eq!(config.rpc.and_then(|rpc| rpc.port), Some(9092));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/dashboard.log")));

        let missing = file.path().with_extension("missing");
        assert!(read_file_config(&missing).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[views]\nmax_tabs = \"many\"").unwrap();
        assert!(read_file_config(file.path()).is_err());
    }

    #[test]
    fn endpoint_prefers_explicit_url() {
        let rpc = RpcConfig {
            scheme: "http".into(),
            host: "nas".into(),
            port: 9091,
            path: "transmission/rpc".into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(1),
            verify_ssl: true,
            user_agent: String::new(),
            url: None,
        };
        assert_eq!(rpc.endpoint(), "http://nas:9091/transmission/rpc");
        let rpc = RpcConfig {
            url: Some("https://example.org/rpc".into()),
            ..rpc
        };
        assert_eq!(rpc.endpoint(), "https://example.org/rpc");
    }
}
