//! Pipeline execution: processes, steps, markers and the run loop

pub mod engine;
pub mod executor;
pub mod gate;
pub mod markers;
pub mod process;
pub mod regression;
pub mod variables;

pub use engine::{EngineHandle, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{resolve_build_ambiguity, StepExecutor, OUTPUT_CAP_BYTES};
pub use gate::PauseGate;
pub use markers::{compare, evaluate_markers};
pub use process::{run_process, shell_command, ProcessError, ProcessOutcome, ProcessOutput};
pub use regression::RegressionPolicy;
pub use variables::resolve_variables;
