//! Regression detection over marker pass counts

use serde::{Deserialize, Serialize};

/// Tuning for the regression rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionPolicy {
    /// Minimum number of iterations before regression can be declared
    #[serde(default = "default_window")]
    pub window: usize,

    /// Strictly worsening steps required at the end of the history
    #[serde(default = "default_consecutive")]
    pub consecutive_declines: usize,
}

fn default_window() -> usize {
    4
}

fn default_consecutive() -> usize {
    3
}

impl Default for RegressionPolicy {
    fn default() -> Self {
        Self {
            window: default_window(),
            consecutive_declines: default_consecutive(),
        }
    }
}

impl RegressionPolicy {
    /// Decide whether the pass-count history is trending worse
    ///
    /// `pass_counts` is ordered oldest first. Regression requires the last
    /// `consecutive_declines` transitions to be strict declines AND the newest
    /// count to sit below the session's first count.
    pub fn is_regressing(&self, pass_counts: &[usize]) -> bool {
        let declines = self.consecutive_declines.max(1);
        let needed = self.window.max(declines + 1);
        if pass_counts.len() < needed {
            return false;
        }

        let tail = &pass_counts[pass_counts.len() - (declines + 1)..];
        let worsening = tail.windows(2).all(|pair| pair[1] < pair[0]);

        let newest = tail[tail.len() - 1];
        worsening && newest < pass_counts[0]
    }
}
