//! A live, sorted and filtered view over one kind's slice of the registry.

use std::collections::HashMap;

use log::debug;

use crate::{
    error::ViewError,
    filter::Filter,
    model::{Entity, EntityId, EntityKind},
    registry::Registry,
    schema::schema,
    sort::SortSpec,
};

/// Restricts a child list to the entities belonging to one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub attribute: &'static str,
    pub parent: EntityId,
}

impl Scope {
    /// Children of `parent` for a child kind; `None` if the kind has no parent.
    pub fn children_of(kind: EntityKind, parent: EntityId) -> Option<Self> {
        schema(kind)
            .parent
            .map(|attribute| Self { attribute, parent })
    }

    fn admits(&self, entity: &Entity) -> bool {
        entity.text(self.attribute) == Some(self.parent.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ListModel {
    kind: EntityKind,
    scope: Option<Scope>,
    sort: SortSpec,
    filters: Vec<Filter>,
    rows: Vec<EntityId>,
    stale: bool,
    focus: Option<EntityId>,
    focus_index: Option<usize>,
}

impl ListModel {
    pub fn new(kind: EntityKind, scope: Option<Scope>, sort: SortSpec) -> Self {
        let sort = if sort.kind() == kind {
            sort
        } else {
            SortSpec::builtin(kind)
        };
        Self {
            kind,
            scope,
            sort,
            filters: Vec::new(),
            rows: Vec::new(),
            stale: true,
            focus: None,
            focus_index: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Marks the cached view out of date; the next read recomputes it.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn set_sort(&mut self, spec: SortSpec) -> Result<(), ViewError> {
        if !schema(self.kind).capabilities.sort {
            return Err(ViewError::Unsupported {
                kind: self.kind,
                action: "sorted",
            });
        }
        if spec.kind() != self.kind {
            return Err(ViewError::Unsupported {
                kind: self.kind,
                action: "sorted by another kind's keys",
            });
        }
        self.sort = spec;
        self.invalidate();
        Ok(())
    }

    pub fn push_filter(&mut self, filter: Filter) -> Result<(), ViewError> {
        if !schema(self.kind).capabilities.filter {
            return Err(ViewError::Unsupported {
                kind: self.kind,
                action: "filtered",
            });
        }
        if filter.kind() != self.kind {
            return Err(ViewError::Unsupported {
                kind: self.kind,
                action: "filtered by another kind's predicates",
            });
        }
        self.filters.push(filter);
        self.invalidate();
        Ok(())
    }

    pub fn pop_filter(&mut self) -> Option<Filter> {
        let popped = self.filters.pop();
        if popped.is_some() {
            self.invalidate();
        }
        popped
    }

    pub fn clear_filters(&mut self) -> usize {
        let cleared = self.filters.len();
        self.filters.clear();
        if cleared > 0 {
            self.invalidate();
        }
        cleared
    }

    /// Whether `entity` belongs in this view regardless of order.
    pub fn admits(&self, entity: &Entity) -> bool {
        entity.kind == self.kind
            && self.scope.as_ref().map_or(true, |scope| scope.admits(entity))
            && self.filters.iter().all(|filter| filter.matches(entity))
    }

    /// The current view, recomputed first if anything changed since the last read.
    pub fn view<'r>(&mut self, registry: &'r Registry) -> Vec<&'r Entity> {
        self.refresh(registry);
        self.rows
            .iter()
            .filter_map(|id| registry.get(self.kind, id))
            .collect()
    }

    pub fn ids(&mut self, registry: &Registry) -> &[EntityId] {
        self.refresh(registry);
        &self.rows
    }

    pub fn len(&mut self, registry: &Registry) -> usize {
        self.ids(registry).len()
    }

    pub fn is_empty(&mut self, registry: &Registry) -> bool {
        self.len(registry) == 0
    }

    /// Focused identifier as of the last recompute.
    pub fn focused_identifier(&self) -> Option<&EntityId> {
        self.focus.as_ref()
    }

    pub fn focused_index(&self) -> Option<usize> {
        self.focus_index
    }

    pub fn focused<'r>(&mut self, registry: &'r Registry) -> Option<&'r Entity> {
        self.refresh(registry);
        let id = self.focus.as_ref()?;
        registry.get(self.kind, id)
    }

    /// Moves focus by `delta` rows, clamped to the view.
    pub fn navigate(&mut self, registry: &Registry, delta: isize) {
        self.refresh(registry);
        let Some(last) = self.rows.len().checked_sub(1) else {
            return;
        };
        let current = self.focus_index.unwrap_or(0) as isize;
        let next = current.saturating_add(delta).clamp(0, last as isize) as usize;
        self.set_focus_index(next);
    }

    pub fn focus_first(&mut self, registry: &Registry) {
        self.refresh(registry);
        if !self.rows.is_empty() {
            self.set_focus_index(0);
        }
    }

    pub fn focus_last(&mut self, registry: &Registry) {
        self.refresh(registry);
        if let Some(last) = self.rows.len().checked_sub(1) {
            self.set_focus_index(last);
        }
    }

    /// Focuses `id` if it is in the view.
    pub fn focus_on(&mut self, registry: &Registry, id: &EntityId) -> bool {
        self.refresh(registry);
        match self.rows.iter().position(|row| row == id) {
            Some(index) => {
                self.set_focus_index(index);
                true
            }
            None => false,
        }
    }

    fn set_focus_index(&mut self, index: usize) {
        self.focus = self.rows.get(index).cloned();
        self.focus_index = self.focus.as_ref().map(|_| index);
    }

    fn refresh(&mut self, registry: &Registry) {
        if !self.stale {
            return;
        }
        let mut members: Vec<&Entity> = registry
            .iter(self.kind)
            .filter(|entity| self.admits(entity))
            .collect();
        members.sort_by(|a, b| self.sort.compare(a, b));
        let rows: Vec<EntityId> = members.into_iter().map(|e| e.id.clone()).collect();
        debug!(
            "recomputed {} view: {} of {} rows",
            self.kind,
            rows.len(),
            registry.len(self.kind)
        );
        let focus = self.remap_focus(&rows);
        self.rows = rows;
        self.stale = false;
        match focus {
            Some(index) => self.set_focus_index(index),
            None => {
                self.focus = None;
                self.focus_index = None;
            }
        }
    }

    /// Position of the focus in `rows`: the same identifier if it survived,
    /// otherwise the survivor that sat closest to it in the previous view.
    fn remap_focus(&self, rows: &[EntityId]) -> Option<usize> {
        if rows.is_empty() {
            return None;
        }
        if let Some(id) = &self.focus {
            if let Some(index) = rows.iter().position(|row| row == id) {
                return Some(index);
            }
        }
        let Some(previous) = self.focus_index else {
            return Some(0);
        };
        let old_positions: HashMap<&EntityId, usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(index, id)| (id, index))
            .collect();
        let nearest = rows
            .iter()
            .enumerate()
            .filter_map(|(index, id)| old_positions.get(id).map(|old| (index, *old)))
            // Equal distance prefers the row that followed the old focus.
            .min_by_key(|(_, old)| (old.abs_diff(previous), *old < previous))
            .map(|(index, _)| index);
        Some(nearest.unwrap_or_else(|| previous.min(rows.len() - 1)))
    }
}
