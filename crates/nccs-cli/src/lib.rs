//! Library side of the `nccs` binary: configuration, logging, the staged
//! build driver and terminal summaries.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod review;
pub mod summary;
pub mod types;
