#![allow(clippy::uninlined_format_args)]
#![doc = include_str!("../README.md")]

pub mod bundler;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetch;
pub mod module_loader;
pub mod playground;
pub mod protocol;
pub mod worker;

#[macro_use]
extern crate lazy_static;

pub use anyhow;
pub use config::BundlerConfig;
pub use error::{BundlerError, FetchError};
pub use playground::PlaygroundBundler;
pub use protocol::{CompileOutcome, WorkerRequest, WorkerResponse};
pub use serde_json;
pub use worker::BundlerWorker;
