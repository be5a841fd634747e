//! # analyst-core
//!
//! Domain types and contracts for the tabular analysis job service.
//!
//! This crate defines the shapes every other crate in the workspace agrees
//! on: a [`Job`] and its [`ProgressEvent`] stream, the [`BrokerClient`]
//! trait a durable queue backend must satisfy, the [`Frame`]/[`Schema`]
//! types that the file-loading and schema-inspection layers produce, and
//! the [`CoreError`] taxonomy that every component boundary converts into.
//!
//! Nothing here does IO. Backends ([`analyst-broker-postgres`], the
//! production `ModelClient`/`CodeExecutor` in `analyst-orchestrator`) live
//! in their own crates and depend on this one, not the other way around.
//!
//! [`analyst-broker-postgres`]: https://docs.rs/analyst-broker-postgres

mod broker;
mod config;
mod datafile;
mod error;
mod frame;
mod job;
mod progress;
mod schema;

pub mod api;
pub mod inmemory;

pub use broker::{BrokerClient, ClaimedLease, FailureKind, JobOutcome};
pub use config::Config;
pub use datafile::{DataFile, FileFormat};
pub use error::CoreError;
pub use frame::{ColumnType, Frame, FrameValue};
pub use job::{Job, JobError, JobId, JobState};
pub use progress::{Phase, ProgressEvent};
pub use schema::{Column, Schema, SemanticHint};

pub use async_trait::async_trait;
