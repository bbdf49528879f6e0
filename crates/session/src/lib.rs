//! Client side of the assignment service.
//!
//! This crate provides:
//! - The service wire format
//! - The `AssignmentService` boundary, with HTTP and in-process implementations
//! - A `Session` that keeps the latest snapshot and its layout, applying
//!   responses last-snapshot-wins
//! - Presentation summaries of movement statistics

pub mod error;
pub mod http;
pub mod local;
pub mod service;
pub mod session;
pub mod stats;
pub mod wire;

pub use error::{Result, SessionError};
pub use http::HttpService;
pub use local::LocalService;
pub use service::AssignmentService;
pub use session::{Failure, Outcome, Session, View};
pub use stats::{ComparisonRow, StatsSummary};
pub use wire::{AlgorithmComparison, Operation, Statistics, WireState};
