//! Shared data models for the Transloadit client.
//!
//! This crate provides Serde-friendly types for:
//! - Steps and their robot options
//! - Assembly status codes and result files
//! - Generic and list API responses

pub mod assembly;
pub mod response;
pub mod step;

pub use assembly::{AssemblyResponse, AssemblyStatus, ResultFile};
pub use response::{ListResponse, Response};
pub use step::{Step, Steps};
