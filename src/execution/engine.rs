//! Main execution engine - drives the run, check, heal loop

use crate::{
    agent::{AgentClientConfig, AgentError, AgentExecutor},
    core::{Iteration, MarkerResult, Pipeline, RunSession, RunStatus, StepData, StepResult},
    execution::{
        gate::{Cancelled, PauseGate},
        markers::evaluate_markers,
        StepExecutor,
    },
    healing::HealingLoop,
};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        session_id: Uuid,
        pipeline_name: String,
        max_iterations: usize,
    },
    IterationStarted {
        iteration: usize,
    },
    StepStarted {
        iteration: usize,
        step_id: String,
        name: String,
    },
    StepFinished {
        iteration: usize,
        result: StepResult,
    },
    MarkersEvaluated {
        iteration: usize,
        results: Vec<MarkerResult>,
    },
    HealingStarted {
        iteration: usize,
    },
    AgentActivity {
        iteration: usize,
        message: String,
    },
    HealingFinished {
        iteration: usize,
        analysis: String,
        changes: Vec<String>,
    },
    Paused,
    Resumed,
    RegressionDetected {
        iteration: usize,
        pass_counts: Vec<usize>,
    },
    RunFinished {
        session_id: Uuid,
        status: RunStatus,
        summary: String,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to registered handlers
#[derive(Clone, Default)]
struct EventBus {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventBus {
    fn add(&self, handler: EventHandler) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).push(handler);
    }

    fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Pause/resume/cancel controls for a running engine
///
/// Cheap to clone and safe to use from another task.
#[derive(Clone)]
pub struct EngineHandle {
    gate: PauseGate,
    cancel: Arc<Mutex<CancellationToken>>,
    events: EventBus,
}

impl EngineHandle {
    /// Hold the run at its next step or iteration boundary
    pub fn pause(&self) {
        if !self.gate.is_paused() {
            self.gate.pause();
            info!("Pipeline paused");
            self.events.emit(ExecutionEvent::Paused);
        }
    }

    pub fn resume(&self) {
        if self.gate.is_paused() {
            self.gate.resume();
            info!("Pipeline resumed");
            self.events.emit(ExecutionEvent::Resumed);
        }
    }

    /// Cancel the run, killing any in-flight command or agent
    ///
    /// Also opens the gate so a paused run observes the cancellation.
    pub fn cancel(&self) {
        warn!("Cancellation requested");
        self.token().cancel();
        self.gate.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fresh token for a new run
    fn reset(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }
}

/// Why the loop stopped early
enum Fault {
    Cancelled,
    Agent(AgentError),
}

impl From<Cancelled> for Fault {
    fn from(_: Cancelled) -> Self {
        Fault::Cancelled
    }
}

impl From<AgentError> for Fault {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Cancelled => Fault::Cancelled,
            other => Fault::Agent(other),
        }
    }
}

/// Main pipeline execution engine
///
/// Runs one pipeline at a time; callers must not start a second run on the
/// same engine while one is active.
pub struct ExecutionEngine<A: AgentExecutor> {
    executor: StepExecutor,
    healer: HealingLoop<A>,
    events: EventBus,
    handle: EngineHandle,
}

impl<A: AgentExecutor> ExecutionEngine<A> {
    pub fn new(agent: A, agent_config: AgentClientConfig) -> Self {
        let events = EventBus::default();
        Self {
            executor: StepExecutor::new(),
            healer: HealingLoop::new(Arc::new(agent), agent_config),
            handle: EngineHandle {
                gate: PauseGate::new(),
                cancel: Arc::new(Mutex::new(CancellationToken::new())),
                events: events.clone(),
            },
            events,
        }
    }

    pub fn with_executor(mut self, executor: StepExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add(Arc::new(handler));
    }

    /// Controls for the current (or next) run
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Run the pipeline to a terminal state
    ///
    /// Never fails: faults end the session as `Failed` with the message in
    /// `RunSession::error`, cancellation ends it as `Aborted`.
    pub async fn run(&self, pipeline: &Pipeline) -> RunSession {
        let cancel = self.handle.reset();
        self.healer.reset_costs();

        let mut session = RunSession::new(pipeline.name.clone());
        info!(
            session_id = %session.id,
            pipeline = %pipeline.name,
            max_iterations = pipeline.max_iterations,
            "Starting pipeline run"
        );
        self.events.emit(ExecutionEvent::RunStarted {
            session_id: session.id,
            pipeline_name: pipeline.name.clone(),
            max_iterations: pipeline.max_iterations,
        });

        let status = match self.run_loop(pipeline, &mut session, &cancel).await {
            Ok(status) => status,
            Err(Fault::Cancelled) => {
                warn!(session_id = %session.id, "Run cancelled");
                RunStatus::Aborted
            }
            Err(Fault::Agent(err)) => {
                error!(session_id = %session.id, error = %err, "Run failed");
                session.error = Some(err.to_string());
                RunStatus::Failed
            }
        };

        session.finish(status);
        let summary = session.summary_line();
        info!(session_id = %session.id, status = ?status, "{}", summary);
        self.events.emit(ExecutionEvent::RunFinished {
            session_id: session.id,
            status,
            summary,
        });
        session
    }

    async fn run_loop(
        &self,
        pipeline: &Pipeline,
        session: &mut RunSession,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, Fault> {
        let mut number = 0;

        loop {
            number += 1;
            self.checkpoint(cancel).await?;

            info!(iteration = number, "Starting iteration");
            self.events.emit(ExecutionEvent::IterationStarted { iteration: number });
            let started = Instant::now();

            let mut data = StepData::with_variables(&pipeline.variables);
            data.set("iteration", number.to_string());

            let mut step_results = Vec::with_capacity(pipeline.steps.len());
            for step in &pipeline.steps {
                self.checkpoint(cancel).await?;
                self.events.emit(ExecutionEvent::StepStarted {
                    iteration: number,
                    step_id: step.id.clone(),
                    name: step.name.clone(),
                });

                let result = self
                    .executor
                    .execute(step, &mut data, &pipeline.target_path, cancel)
                    .await;
                if result.cancelled || cancel.is_cancelled() {
                    return Err(Fault::Cancelled);
                }

                self.events.emit(ExecutionEvent::StepFinished {
                    iteration: number,
                    result: result.clone(),
                });
                let stop = result.failed && step.aborts_on_failure();
                step_results.push(result);
                if stop {
                    warn!(iteration = number, step_id = %step.id, "Step failed with abort; skipping remaining steps");
                    break;
                }
            }

            let marker_results = evaluate_markers(&pipeline.markers, &data, &pipeline.target_path);
            self.events.emit(ExecutionEvent::MarkersEvaluated {
                iteration: number,
                results: marker_results.clone(),
            });

            let mut iteration = Iteration {
                number,
                step_results,
                marker_results,
                analysis: String::new(),
                changes: Vec::new(),
                duration_ms: 0,
            };
            info!(iteration = number, "{}", iteration.summary_line());

            if iteration.all_passed() {
                iteration.duration_ms = started.elapsed().as_millis() as u64;
                session.iterations.push(iteration);
                return Ok(RunStatus::Succeeded);
            }

            if pipeline.is_bounded() && number >= pipeline.max_iterations {
                iteration.duration_ms = started.elapsed().as_millis() as u64;
                session.iterations.push(iteration);
                return Ok(RunStatus::Failed);
            }

            let mut pass_counts = session.pass_counts();
            pass_counts.push(iteration.passed_count());
            if pipeline.regression.is_regressing(&pass_counts) {
                warn!(iteration = number, ?pass_counts, "Regression detected");
                iteration.duration_ms = started.elapsed().as_millis() as u64;
                session.iterations.push(iteration);
                session.error = Some(format!("Regression detected: marker pass counts {:?}", pass_counts));
                self.events.emit(ExecutionEvent::RegressionDetected {
                    iteration: number,
                    pass_counts,
                });
                return Ok(RunStatus::Aborted);
            }

            self.checkpoint(cancel).await?;
            self.events.emit(ExecutionEvent::HealingStarted { iteration: number });

            let events = &self.events;
            let activity = move |message: String| {
                events.emit(ExecutionEvent::AgentActivity {
                    iteration: number,
                    message,
                })
            };
            let outcome = self.healer.heal(session, pipeline, &iteration, &activity, cancel).await?;

            self.events.emit(ExecutionEvent::HealingFinished {
                iteration: number,
                analysis: outcome.analysis.clone(),
                changes: outcome.changes.clone(),
            });
            iteration.analysis = outcome.analysis;
            iteration.changes = outcome.changes;
            iteration.duration_ms = started.elapsed().as_millis() as u64;
            session.iterations.push(iteration);
        }
    }

    /// Wait at a progress point while paused
    async fn checkpoint(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if self.handle.gate.is_paused() {
            info!("Run paused; waiting for resume");
        }
        self.handle.gate.wait_open(cancel).await
    }
}
