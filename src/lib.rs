//! # CV Analyzer
//!
//! Background analysis of CVs against a target job, backed by a local
//! language model.
//!
//! A submission (document plus job and candidate context) is validated,
//! the document is stored, and a `pending` task is handed to a worker. The
//! worker extracts the document text, optionally narrows it to the passages
//! most relevant to the job, renders the analysis prompt and stores the
//! model's report. Clients poll the task by id.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐
//! │ HTTP / CLI │──▶│  Analyzer  │──▶│  SQLite    │
//! │  submit    │   │  (submit)  │   │  tasks     │
//! └────────────┘   └─────┬──────┘   └─────▲──────┘
//!                        │ schedule       │ transition
//!                        ▼                │
//!                  ┌────────────┐   ┌─────┴──────┐
//!                  │ WorkerPool │──▶│  execute   │──▶ Ollama
//!                  └────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`submission`] | Submission validation |
//! | [`analysis`] | Pipeline and task state machine |
//! | [`worker`] | In-process worker pool and batch drain |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`retrieval`] | Passage selection for long documents |
//! | [`inference`] | Chat and embedding backend |
//! | [`storage`] | Document storage |
//! | [`sqlite_store`] | SQLite task store |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Pure logic (task model, chunking, scoring, prompt rendering and the
//! [`TaskStore`](cv_analyzer_core::store::TaskStore) trait) lives in the
//! `cv-analyzer-core` crate.

pub mod analysis;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod inference;
pub mod migrate;
pub mod retrieval;
pub mod server;
pub mod sqlite_store;
pub mod storage;
pub mod submission;
pub mod worker;
