//! findex keeps a queryable SQLite index of scanned files in step with the
//! CSV artifact a filesystem scanner writes.
//!
//! The [`watch::ChangeWatcher`] re-reads the artifact when it changes and
//! hands it to the [`sync::SyncEngine`], which parses it with [`record`] and
//! upserts the valid rows through a [`store::Store`]. Clients reach the index
//! through [`service::IndexService`], either in-process or over [`ipc`] to a
//! `findex serve` daemon.

pub mod cmd;
pub mod config;
pub mod error;
pub mod integrity;
pub mod ipc;
pub mod record;
pub mod search;
pub mod service;
pub mod store;
pub mod sync;
pub mod types;
pub mod usock;
pub mod watch;

pub use error::{Error, Result};
