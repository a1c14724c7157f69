//! Scheduling policies.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Which thread runs next, and when the running one must give way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingPolicy {
    /// Lowest priority value first, FIFO among equals. Preempt when a
    /// strictly more urgent thread is ready.
    Priority,
    /// One FIFO queue, preempt after a full quantum.
    #[default]
    RoundRobin,
    /// Three FIFO levels with quanta Q, 2Q and 4Q. Exhausting the quantum
    /// demotes a thread one level.
    MultilevelFeedback,
}

impl SchedulingPolicy {
    /// Number of ready queues the policy uses.
    pub fn queue_count(self) -> usize {
        match self {
            SchedulingPolicy::MultilevelFeedback => crate::config::FEEDBACK_LEVELS,
            _ => 1,
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulingPolicy::Priority => "priority",
            SchedulingPolicy::RoundRobin => "round-robin",
            SchedulingPolicy::MultilevelFeedback => "multilevel-feedback",
        };
        f.write_str(name)
    }
}
