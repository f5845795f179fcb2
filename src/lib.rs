// src/lib.rs

//! depsolver - RPM dependency solver service
//!
//! A single-shot solver invoked as a subprocess by an image-build
//! orchestrator: one JSON request on stdin, one JSON response on stdout,
//! then exit.
//!
//! # Architecture
//!
//! - One process per request: no daemon, no shared in-process state
//! - Repositories come from the request and, optionally, an image root's
//!   `etc/yum.repos.d`
//! - Metadata is cached on disk per repository and revalidated after a
//!   short expiry window
//! - Transactions chain: each depsolve step resolves on top of the
//!   previous step's result
//! - Errors cross the solver boundary as tagged values, never as panics

pub mod config;
mod error;
pub mod gpg;
pub mod query;
pub mod repository;
pub mod request;
pub mod response;
pub mod sack;
pub mod service;
pub mod solver;
pub mod version;

pub use error::{Error, Result};
