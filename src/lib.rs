//! Live, tabbed views over the entities a Transmission daemon reports.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod keymap;
pub mod list;
pub mod model;
pub mod rate;
pub mod registry;
pub mod rpc;
pub mod schema;
pub mod sort;
pub mod source;
pub mod sync;
pub mod tabs;
pub mod workspace;
