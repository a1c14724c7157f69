//! Thread priority levels.
//!
//! Lower values are more urgent: priority 0 beats priority 1.

use core::fmt;

/// Thread priority. Smaller value = higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Most urgent priority.
    pub const HIGHEST: Priority = Priority(0);
    /// Priority given to threads that do not ask for one.
    pub const DEFAULT: Priority = Priority(4);
    /// Least urgent priority.
    pub const LOWEST: Priority = Priority(u8::MAX);

    pub const fn new(value: u8) -> Self {
        Priority(value)
    }

    /// Get the numeric priority value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether `self` should run before `other`.
    pub fn is_higher_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
