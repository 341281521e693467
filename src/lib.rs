#![doc = "page-transform: core pipeline that turns classic wiki and web part pages into modern client-side pages."]

//! The pipeline reads pages through a [`contract::SourceProvider`], maps them
//! (wiki splitting, content normalization, layout, metadata) and writes them
//! through a [`contract::TargetContext`]. Batch runs are driven by a
//! [`process::TransformationProcess`] with durable status tracking.
//!
//! # Usage
//! Build an executor from [`options::PageTransformationOptions`], create a
//! process and start it against a source and a target:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use page_transform::contract::{SourceProvider, TargetContext, TransformationExecutor};
//! # use page_transform::options::PageTransformationOptions;
//! # use page_transform::process::InProcessTransformationExecutor;
//! # async fn demo(source: Arc<dyn SourceProvider>, target: Arc<dyn TargetContext>) -> page_transform::error::Result<()> {
//! let executor = InProcessTransformationExecutor::from_options(PageTransformationOptions::default());
//! let process = executor.create_transformation_process().await?;
//! process.start_process(source, target).await?;
//! let status = process.wait_for_completion().await?;
//! println!("{} done, {} errors", status.done, status.errors);
//! # Ok(())
//! # }
//! ```

pub mod contract;
pub mod distiller;
pub mod error;
pub mod generator;
pub mod layout;
pub mod mapping;
pub mod markup;
pub mod model;
pub mod normalizer;
pub mod options;
pub mod page;
pub mod process;
pub mod splitter;
pub mod state;
pub mod status;
pub mod telemetry;
pub mod tokens;
pub mod transformator;

pub use error::{Result, TransformationError};
