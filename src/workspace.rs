//! Everything the UI reads and the poller writes, behind one lock.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{error, info, warn};

use crate::{
    command::{Command, FilterRequest, Motion, PromptKind, Requirement, SortRequest},
    error::{CommandError, SourceError},
    filter::Filter,
    list::{ListModel, Scope},
    model::{Entity, EntityKind},
    rate::{RateEstimator, DEFAULT_STALE_AFTER, DEFAULT_TIME_CONSTANT},
    registry::Registry,
    schema::schema,
    source::RemoteAction,
    sort::SortSpec,
    sync::{self, Batch, RateKey, SyncReport},
    tabs::{ListId, Tab, TabStack, DEFAULT_MAX_TABS},
};

pub type SharedWorkspace = Arc<Mutex<Workspace>>;

/// Locks the workspace. A panic while the lock was held leaves the last
/// fully applied state, so a poisoned lock is used as is.
pub fn lock(shared: &SharedWorkspace) -> MutexGuard<'_, Workspace> {
    shared.lock().unwrap_or_else(|poisoned| {
        error!("workspace lock poisoned; continuing with last state");
        poisoned.into_inner()
    })
}

/// Settings new lists and the rate estimator start from.
#[derive(Debug, Clone)]
pub struct ViewDefaults {
    pub sorts: BTreeMap<EntityKind, SortSpec>,
    pub filters: BTreeMap<EntityKind, Vec<Filter>>,
    pub max_tabs: usize,
    pub rate_time_constant: Duration,
    pub rate_stale_after: Duration,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            sorts: BTreeMap::new(),
            filters: BTreeMap::new(),
            max_tabs: DEFAULT_MAX_TABS,
            rate_time_constant: DEFAULT_TIME_CONSTANT,
            rate_stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl ViewDefaults {
    pub fn sort(&self, kind: EntityKind) -> SortSpec {
        self.sorts
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| SortSpec::builtin(kind))
    }

    pub fn filters(&self, kind: EntityKind) -> &[Filter] {
        self.filters.get(&kind).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
}

impl Notice {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

/// Work the front end carries out after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Quit,
    Help,
    Refresh,
    Prompt(PromptKind),
    Remote(RemoteAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub effect: Effect,
    pub notice: Option<Notice>,
}

impl Outcome {
    fn quiet() -> Self {
        Self::effect(Effect::None)
    }

    fn effect(effect: Effect) -> Self {
        Self {
            effect,
            notice: None,
        }
    }

    fn notice(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            effect: Effect::None,
            notice: Some(Notice::new(severity, text)),
        }
    }

    fn failed(err: CommandError) -> Self {
        Self::notice(Severity::Error, err.to_string())
    }
}

/// A copy of the focused list for rendering.
#[derive(Debug, Clone)]
pub struct ListView {
    pub list: ListId,
    pub kind: EntityKind,
    pub title: String,
    pub rows: Vec<Entity>,
    pub focus: Option<usize>,
    pub sort: String,
    pub filters: Vec<String>,
}

#[derive(Debug)]
pub struct Workspace {
    registry: Registry,
    rates: RateEstimator<RateKey>,
    lists: BTreeMap<ListId, ListModel>,
    tabs: TabStack,
    next_list: u64,
    defaults: ViewDefaults,
    available: Vec<EntityKind>,
}

impl Workspace {
    /// Starts with a single unscoped torrent list in the root tab.
    pub fn new(defaults: ViewDefaults) -> Self {
        let root = ListId(0);
        let model = new_model(&defaults, EntityKind::Torrent, None);
        let tabs = TabStack::new(
            Tab::new(root, EntityKind::Torrent.plural()),
            defaults.max_tabs,
        );
        Self {
            registry: Registry::new(),
            rates: RateEstimator::new(defaults.rate_time_constant, defaults.rate_stale_after),
            lists: BTreeMap::from([(root, model)]),
            tabs,
            next_list: 1,
            defaults,
            available: EntityKind::ALL.to_vec(),
        }
    }

    /// Restricts list kinds to those a source reports. Torrents are mandatory.
    pub fn attach(&mut self, kinds: &[EntityKind]) -> Result<(), SourceError> {
        if !kinds.contains(&EntityKind::Torrent) {
            return Err(SourceError::MissingKind(EntityKind::Torrent));
        }
        for kind in EntityKind::ALL {
            if !kinds.contains(&kind) {
                info!("source does not report {kind}; those lists are disabled");
            }
        }
        self.available = kinds.to_vec();
        Ok(())
    }

    /// Applies a batch and marks lists of every touched kind for recomputation.
    pub fn apply(&mut self, batch: Batch) -> SyncReport {
        let report = sync::apply(&mut self.registry, &mut self.rates, batch);
        let affected = report.affected_kinds();
        for list in self.lists.values_mut() {
            if affected.contains(&list.kind()) {
                list.invalidate();
            }
        }
        report
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tabs(&self) -> &TabStack {
        &self.tabs
    }

    pub fn list(&self, id: ListId) -> Option<&ListModel> {
        self.lists.get(&id)
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    pub fn current_kind(&self) -> EntityKind {
        self.list(self.tabs.current().list)
            .map_or(EntityKind::Torrent, ListModel::kind)
    }

    pub fn current_view(&mut self) -> Option<ListView> {
        let tab = self.tabs.current();
        let (id, title) = (tab.list, tab.label.clone());
        let list = self.lists.get_mut(&id)?;
        let rows = list.view(&self.registry).into_iter().cloned().collect();
        Some(ListView {
            list: id,
            kind: list.kind(),
            title,
            rows,
            focus: list.focused_index(),
            sort: list.sort().to_string(),
            filters: list.filters().iter().map(ToString::to_string).collect(),
        })
    }

    pub fn focused(&mut self) -> Option<Entity> {
        let (list, registry) = self.current_entry().ok()?;
        list.focused(registry).cloned()
    }

    /// Opens a list in a new tab. Child kinds are scoped to the entity
    /// focused in the current list, which must be able to open them.
    pub fn open_list(&mut self, kind: EntityKind, filter: Option<&str>) -> Result<ListId, CommandError> {
        if !self.available.contains(&kind) {
            return Err(CommandError::Unavailable(kind));
        }
        let (scope, mut label) = match schema(kind).parent {
            None => (None, kind.plural().to_string()),
            Some(_) => {
                let (list, registry) = self.current_entry()?;
                Requirement::SubList(kind).check(list.kind())?;
                let parent = list
                    .focused(registry)
                    .ok_or(CommandError::NothingFocused("torrent"))?;
                (
                    Scope::children_of(kind, parent.id.clone()),
                    format!("{kind}: {}", parent.label()),
                )
            }
        };
        let mut model = new_model(&self.defaults, kind, scope);
        if let Some(text) = filter {
            let filter = Filter::parse(kind, text)?;
            label = format!("{label} [{filter}]");
            model.push_filter(filter)?;
        }
        let id = ListId(self.next_list);
        self.tabs.push(Tab::new(id, label))?;
        self.next_list += 1;
        self.lists.insert(id, model);
        Ok(id)
    }

    /// Closes the focused tab and drops its list. The root tab stays.
    pub fn close_current(&mut self) -> bool {
        match self.tabs.close_focused() {
            Some(tab) => {
                self.lists.remove(&tab.list);
                true
            }
            None => false,
        }
    }

    pub fn execute(&mut self, command: &Command) -> Outcome {
        if let Some(requirement) = command.requirement() {
            if let Err(err) = requirement.check(self.current_kind()) {
                return Outcome::failed(err);
            }
        }
        match command {
            Command::Quit => Outcome::effect(Effect::Quit),
            Command::Help => Outcome::effect(Effect::Help),
            Command::Refresh => Outcome::effect(Effect::Refresh),
            Command::Prompt(kind) => Outcome::effect(Effect::Prompt(*kind)),
            Command::Open { kind, filter } => match self.open_list(*kind, filter.as_deref()) {
                Ok(_) => Outcome::quiet(),
                Err(err) => Outcome::failed(err),
            },
            Command::Close => {
                if self.close_current() {
                    Outcome::quiet()
                } else {
                    Outcome::notice(Severity::Info, "The first tab cannot be closed")
                }
            }
            Command::FocusTab(n) => {
                if self.tabs.focus(n.saturating_sub(1)) {
                    Outcome::quiet()
                } else {
                    Outcome::notice(Severity::Warning, format!("No tab {n}"))
                }
            }
            Command::Move(motion) => {
                if let Ok((list, registry)) = self.current_entry() {
                    match motion {
                        Motion::By(delta) => list.navigate(registry, *delta),
                        Motion::First => list.focus_first(registry),
                        Motion::Last => list.focus_last(registry),
                    }
                }
                Outcome::quiet()
            }
            Command::Sort(request) => match self.sort(request) {
                Ok(text) => Outcome::notice(Severity::Info, text),
                Err(err) => Outcome::failed(err),
            },
            Command::Filter(request) => match self.filter(request) {
                Ok(text) => Outcome::notice(Severity::Info, text),
                Err(err) => Outcome::failed(err),
            },
            Command::Start | Command::Stop | Command::Remove { .. } => {
                match self.remote_action(command) {
                    Ok(action) => Outcome::effect(Effect::Remote(action)),
                    Err(err) => Outcome::failed(err),
                }
            }
        }
    }

    fn current_entry(&mut self) -> Result<(&mut ListModel, &Registry), CommandError> {
        let id = self.tabs.current().list;
        match self.lists.get_mut(&id) {
            Some(list) => Ok((list, &self.registry)),
            None => {
                error!("tab {id} has no list");
                Err(CommandError::NothingFocused("list"))
            }
        }
    }

    fn sort(&mut self, request: &SortRequest) -> Result<String, CommandError> {
        let id = self.tabs.current().list;
        let list = self
            .lists
            .get_mut(&id)
            .ok_or(CommandError::NothingFocused("list"))?;
        let kind = list.kind();
        let spec = match request {
            SortRequest::Replace(keys) => SortSpec::new(kind, keys)?,
            SortRequest::Add(key) => list.sort().with_primary(key)?,
            SortRequest::Reset => self.defaults.sort(kind),
            SortRequest::Clear => SortSpec::none(kind),
        };
        list.set_sort(spec)?;
        Ok(format!("Sorting {kind} by {}", list.sort()))
    }

    fn filter(&mut self, request: &FilterRequest) -> Result<String, CommandError> {
        let (list, _) = self.current_entry()?;
        let kind = list.kind();
        match request {
            FilterRequest::Push(text) => {
                let filter = Filter::parse(kind, text)?;
                let shown = filter.to_string();
                list.push_filter(filter)?;
                Ok(format!("Filtering {kind}: {shown}"))
            }
            FilterRequest::Pop => Ok(match list.pop_filter() {
                Some(filter) => format!("Removed filter {filter}"),
                None => "No filter to remove".to_string(),
            }),
            FilterRequest::Clear => match list.clear_filters() {
                0 => Ok("No filters to clear".to_string()),
                n => Ok(format!("Cleared {n} filter(s)")),
            },
        }
    }

    fn remote_action(&mut self, command: &Command) -> Result<RemoteAction, CommandError> {
        let (list, registry) = self.current_entry()?;
        let torrent = list
            .focused(registry)
            .ok_or(CommandError::NothingFocused("torrent"))?;
        let ids = vec![torrent.id.clone()];
        Ok(match command {
            Command::Start => RemoteAction::Start(ids),
            Command::Stop => RemoteAction::Stop(ids),
            Command::Remove { delete_data } => RemoteAction::Remove {
                ids,
                delete_data: *delete_data,
            },
            other => {
                return Err(CommandError::Unknown(other.to_string()));
            }
        })
    }
}

fn new_model(defaults: &ViewDefaults, kind: EntityKind, scope: Option<Scope>) -> ListModel {
    let mut model = ListModel::new(kind, scope, defaults.sort(kind));
    for filter in defaults.filters(kind) {
        if let Err(err) = model.push_filter(filter.clone()) {
            warn!("ignoring default filter {filter}: {err}");
        }
    }
    model
}
