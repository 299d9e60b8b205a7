//! `ClickUp` tag catalogue and bulk tag mutation service.
//!
//! This crate provides:
//! - An HTTP client for the `ClickUp` v2 API behind the [`Upstream`] trait
//! - A tree walker over team, space, folder, list and task
//! - A deduplicated tag catalogue with usage counts
//! - Rename, delete and recolor of a tag across every task that carries it
//! - Linear retry with per-attempt timeouts and cancellation
//! - An HTTP server exposing the operations (standalone service)

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Every operation can fail upstream

pub mod catalogue;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod mutation;
pub mod retry;
pub mod server;
pub mod service;
pub mod walker;

pub use catalogue::{TagCatalogue, TagUsage};
pub use client::{ClickUpClient, Upstream};
pub use config::{Config, RetryConfig};
pub use error::{TagError, UpstreamError};
pub use models::*;
pub use mutation::{MutationCoordinator, MutationOutcome, TaskTagEdit};
pub use retry::RetryPolicy;
pub use service::TagService;
pub use walker::{Traversal, TreeWalker, WalkEvent};
