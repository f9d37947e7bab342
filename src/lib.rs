//! Incremental documentation generation.
//!
//! Sources are fingerprinted into a persistent cache so only changed files
//! are regenerated. Regenerated documents are reconciled with whatever is
//! already on disk, keeping hand-written sections, before being written
//! atomically.

mod atomic;
pub mod batch;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conflict;
pub mod detect;
pub mod error;
pub mod events;
pub mod generate;
pub mod git;
pub mod language;
pub mod logging;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod project;
pub mod services;

pub use batch::{BatchOptions, BatchOrchestrator, BatchProcessingResult, ProgressTracker};
pub use cache::{CacheEntry, CacheStore};
pub use conflict::{ConflictInfo, ConflictResolver, ConflictType, ResolutionStrategy};
pub use detect::ChangeDetector;
pub use error::{Error, Result};
pub use events::{EventBus, EventType, ProgressEvent, ProgressListener};
pub use merge::{ContentMerger, MergeStrategy};
pub use pipeline::{FileProcessingResult, ProcessingPipeline};
