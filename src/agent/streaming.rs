//! Streaming support for agent execution
//!
//! Each stdout line of the agent is parsed into an [`AgentEvent`] and handed
//! to a [`ProgressCallback`] as soon as it arrives. Delivery is
//! fire-and-forget: the callback runs on the invoking task and never slows
//! the subprocess, which is drained independently.
//!
//! # Example
//!
//! ```no_run
//! use healing_pipeline::agent::{AgentEvent, ProgressCallback};
//!
//! struct LivePrinter;
//!
//! impl ProgressCallback for LivePrinter {
//!     fn on_event(&self, event: &AgentEvent) {
//!         if let AgentEvent::Assistant { text, .. } = event {
//!             println!("{}", text);
//!         }
//!     }
//! }
//! ```

use crate::agent::AgentEvent;

/// Callback for processing events as they arrive from streaming execution
///
/// This trait is object-safe and can be used as `&dyn ProgressCallback`.
pub trait ProgressCallback: Send + Sync {
    /// Called for each line read from the agent, including raw lines
    fn on_event(&self, event: &AgentEvent);
}

/// No-op callback
#[derive(Debug, Clone, Default)]
pub struct NoopCallback;

impl ProgressCallback for NoopCallback {
    fn on_event(&self, _event: &AgentEvent) {}
}

impl<F> ProgressCallback for F
where
    F: Fn(&AgentEvent) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_callback_collects_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = move |event: &AgentEvent| sink.lock().unwrap().push(event.clone());

        callback.on_event(&AgentEvent::Other {
            kind: "system".to_string(),
        });
        callback.on_event(&AgentEvent::Raw {
            line: "garbage".to_string(),
        });

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_progress_callback_as_option() {
        fn with_optional_callback(callback: Option<&dyn ProgressCallback>) {
            if let Some(cb) = callback {
                cb.on_event(&AgentEvent::Other {
                    kind: "system".to_string(),
                });
            }
        }

        with_optional_callback(Some(&NoopCallback));
        with_optional_callback(None);
    }
}
