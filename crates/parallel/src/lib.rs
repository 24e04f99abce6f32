//! # covershift parallel
//!
//! Execution strategies for block-wise raster stages.
//!
//! This crate provides:
//! - `ProcessingMode` and `Executor`: sequential or rayon-backed mapping over
//!   independent blocks, results in input order
//! - `Batches`: bounded groups of block windows
//! - `CancelToken`: cooperative cancellation between batches
//!
//! Without the `parallel` feature every mode runs sequentially.

pub mod blocks;
pub mod cancel;
pub mod strategy;

pub use blocks::{default_batch_size, Batches};
pub use cancel::CancelToken;
pub use strategy::{set_num_threads, Executor, ParallelStrategy, ProcessingMode};
