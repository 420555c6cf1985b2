//! stash-core - Core library for Stash
//!
//! This crate contains the record models, the remote document-store and
//! media boundaries, and the client-side logic that keeps a signed-in
//! user's todos and media index mirrored locally. Every interface (the CLI
//! today) builds on these pieces.

pub mod alert;
pub mod auth;
pub mod collections;
pub mod config;
pub mod error;
pub mod media;
pub mod mirror;
pub mod models;
pub mod picker;
pub mod store;
pub mod upload;
pub mod util;
pub mod watcher;

pub use alert::Alert;
pub use error::{Error, ErrorKind, Result};
pub use models::{MediaItem, Record, Task};
