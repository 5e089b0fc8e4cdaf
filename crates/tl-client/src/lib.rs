//! Client for the Transloadit media-processing API.
//!
//! This crate provides:
//! - Signed REST requests with rate-limit aware retries
//! - Assemblies with multipart or resumable (tus) uploads
//! - Live assembly events over server-sent events
//! - Templates, billing and signed Smart CDN URLs

pub mod assembly;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod metrics;
mod request;
pub mod retry;
pub mod signature;
pub mod sse;
pub mod template;
pub mod tus;
pub mod upload;

pub use assembly::Assembly;
pub use client::Transloadit;
pub use config::ClientConfig;
pub use error::{TransloaditError, TransloaditResult};
pub use listener::AssemblyListener;
pub use logging::AssemblyLogger;
pub use retry::RetryConfig;
pub use signature::SignatureProvider;
pub use template::Template;
pub use tus::{MemoryUrlStore, UrlStore};
pub use upload::{UploadFile, UploadSource};

pub use tl_models::{
    AssemblyResponse, AssemblyStatus, ListResponse, Response, ResultFile, Step, Steps,
};
