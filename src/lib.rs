//! wpe-backup: scheduled off-site backups through the WP Engine hosting API.
//!
//! Registers sub-daily recurring intervals, guarantees at most one scheduled
//! backup in flight, resolves the target install by paging the remote install
//! listing, and drives each backup request through a logged lifecycle.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;
pub mod settings;

pub mod api;
pub mod store;

pub mod resolver;
pub mod schedule;

pub mod daemon;
pub mod engine;
