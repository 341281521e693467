//! Command line driver for the `page-transform` pipeline.
//!
//! Pages are read from and written to local folders (see [`local`]); run
//! state is persisted under the configured state folder so interrupted
//! batches can be resumed.

pub mod cli;
pub mod load_config;
pub mod local;

pub use cli::{run, Cli, Commands};
