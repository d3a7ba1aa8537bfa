//! Core domain models for Pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, markers and the record of a run.

pub mod config;
pub mod context;
pub mod marker;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use marker::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
