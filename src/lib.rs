// src/lib.rs

//! Prism Package Indexer
//!
//! Maintains a private index over a directory of package archives
//! (sdists, eggs, wheels): a content-addressed master catalog, one
//! version listing ("leaf") per package and a root listing of all
//! packages, rendered as HTML or kept as a symlink farm.
//!
//! # Architecture
//!
//! - Disk is the source of truth: every listing can be rebuilt from the
//!   archives in the repository root
//! - Master catalog: MD5 -> {name, version, filename, added}, one lock
//! - Leaves: per-package documents, one lock per package name
//! - Quarantine: archives that cannot be read are moved aside, never indexed
//! - Events: additions, removals and bulk updates flow through one pipeline

pub mod archive;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod document;
mod error;
pub mod events;
pub mod index;
pub mod leaf;
pub mod packages;
pub mod pool;
pub mod quarantine;
pub mod reconcile;
pub mod render;
pub mod root;

pub use config::Config;
pub use error::{Error, Result};
pub use index::{PackageIndex, Startup};
