//! healing-pipeline - run a pipeline, check its markers, let a coding agent
//! fix what failed, repeat

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod healing;
pub mod persistence;

// Re-export commonly used types
pub use agent::{AgentClientConfig, AgentError, AgentEvent, AgentExecutor, AgentResponse, ProgressCallback, SubprocessClient};
pub use core::{Iteration, Marker, MarkerResult, Pipeline, RunSession, RunStatus, Step, StepData};
pub use execution::{EngineHandle, ExecutionEngine, ExecutionEvent, RegressionPolicy};
