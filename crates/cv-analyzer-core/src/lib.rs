//! # CV Analyzer Core
//!
//! Shared, I/O-free logic for CV Analyzer: the analysis task model and its
//! state machine, the overlapping text chunker, hybrid retrieval scoring,
//! prompt rendering, and the task store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! The application crate supplies storage, extraction, and inference.

pub mod chunk;
pub mod models;
pub mod prompt;
pub mod scoring;
pub mod store;
