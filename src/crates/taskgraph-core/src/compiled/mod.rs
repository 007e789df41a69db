//! Compiled pipelines
//!
//! The compiler turns a composed node/edge list into an immutable
//! [`CompiledPipeline`]: validated, linked (every node knows its predecessor and
//! successor), and identified by a deterministic id.
//!
//! # Overview
//!
//! ```text
//! TaskProfile ──compose──► ComposedGraph ──compile──► CompiledPipeline
//!                                                        │
//!                                     PipelineCache ◄────┘ (Arc, keyed by profile)
//! ```
//!
//! A compiled pipeline holds no handlers, only ids. It serialises to JSON and is
//! embedded in every suspended session, so another process with an equivalent
//! registry can resume it.
//!
//! # Suspension set
//!
//! Checkpoint nodes are always part of the structure. The set of nodes that
//! actually pause a run is chosen at `start` time from the human-review flag
//! ([`CompiledPipeline::suspension_set`]), so one compiled artifact serves both
//! modes.

mod cache;
mod compiler;
mod pipeline;

pub use cache::PipelineCache;
pub use compiler::{compile, compile_composition};
pub use pipeline::{CompiledPipeline, PIPELINE_NAMESPACE};
