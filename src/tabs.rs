use std::fmt;

use log::info;

use crate::error::TabError;

pub const DEFAULT_MAX_TABS: usize = 8;

/// Handle of a list model owned by the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(pub u64);

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub list: ListId,
    pub label: String,
}

impl Tab {
    pub fn new(list: ListId, label: impl Into<String>) -> Self {
        Self {
            list,
            label: label.into(),
        }
    }
}

/// Open tabs with a focus pointer. The root tab at index 0 is never removed,
/// so there is always a focused tab.
#[derive(Debug, Clone)]
pub struct TabStack {
    tabs: Vec<Tab>,
    focus: usize,
    max_depth: usize,
}

impl TabStack {
    pub fn new(root: Tab, max_depth: usize) -> Self {
        Self {
            tabs: vec![root],
            focus: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// Opens `tab` on top of the stack and focuses it.
    pub fn push(&mut self, tab: Tab) -> Result<(), TabError> {
        if self.tabs.len() >= self.max_depth {
            return Err(TabError::Capacity {
                max: self.max_depth,
            });
        }
        info!("opened tab {} ({})", tab.label, tab.list);
        self.tabs.push(tab);
        self.focus = self.tabs.len() - 1;
        Ok(())
    }

    /// Closes the top tab. The root tab stays: returns `None` at depth 1.
    pub fn pop(&mut self) -> Option<Tab> {
        if self.tabs.len() <= 1 {
            return None;
        }
        let tab = self.tabs.pop()?;
        self.focus = self.focus.min(self.tabs.len() - 1);
        info!("closed tab {} ({})", tab.label, tab.list);
        Some(tab)
    }

    /// Closes the focused tab unless it is the root; focus moves left.
    pub fn close_focused(&mut self) -> Option<Tab> {
        if self.focus == 0 {
            return None;
        }
        let tab = self.tabs.remove(self.focus);
        self.focus -= 1;
        info!("closed tab {} ({})", tab.label, tab.list);
        Some(tab)
    }

    pub fn current(&self) -> &Tab {
        &self.tabs[self.focus]
    }

    pub fn current_mut(&mut self) -> &mut Tab {
        &mut self.tabs[self.focus]
    }

    pub fn root(&self) -> &Tab {
        &self.tabs[0]
    }

    /// Focuses the tab at `index`; out-of-range indices are ignored.
    pub fn focus(&mut self, index: usize) -> bool {
        if index < self.tabs.len() {
            self.focus = index;
            true
        } else {
            false
        }
    }

    pub fn focused_index(&self) -> usize {
        self.focus
    }

    pub fn depth(&self) -> usize {
        self.tabs.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn labels(&self) -> Vec<&str> {
        self.tabs.iter().map(|tab| tab.label.as_str()).collect()
    }
}
