// src/task/lifecycle.rs

/// Launch/wait progress of a task.
///
/// Transitions are monotonic: `NotLaunched -> Launched -> Waited`. Each step
/// happens at most once; asking for it again is a silent no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    #[default]
    NotLaunched,
    Launched,
    Waited,
}

impl Lifecycle {
    /// `NotLaunched -> Launched`. Returns `true` if the caller should launch.
    pub fn begin_launch(&mut self) -> bool {
        if *self != Lifecycle::NotLaunched {
            return false;
        }
        *self = Lifecycle::Launched;
        true
    }

    /// `Launched -> Waited`. Returns `true` if the caller should wait.
    ///
    /// Skipped when nothing was launched yet or someone already waited.
    pub fn begin_wait(&mut self) -> bool {
        if *self != Lifecycle::Launched {
            return false;
        }
        *self = Lifecycle::Waited;
        true
    }

    pub fn is_launched(&self) -> bool {
        *self >= Lifecycle::Launched
    }

    pub fn is_waited(&self) -> bool {
        *self == Lifecycle::Waited
    }
}
