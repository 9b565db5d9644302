pub mod analytics;
pub mod cli;
pub mod core;
pub mod corpus;
pub mod detect;
pub mod extractors;
pub mod fetch;
pub mod orchestrator;
pub mod parse;
pub mod store;
pub mod urlnorm;

// --- Primary core exports ---
pub use core::config;
pub use core::errors::{PipelineError, Result};
pub use core::types;
pub use core::types::*;

// --- Component entry points ---
pub use corpus::{dispatch as corpus_dispatch, CorpusRequest, CorpusResponse};
pub use fetch::Fetcher;
pub use orchestrator::{run_batch, run_batch_with, BatchOutcome};
pub use store::{ArtifactKind, ArtifactStore, RelationalIndex};
