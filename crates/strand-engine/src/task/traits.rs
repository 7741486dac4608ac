//! Task traits: priority, shutdown behavior and blocking permission

/// Scheduling priority of a task
///
/// Ready sequences of higher priority are always dequeued before lower ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskPriority {
    /// Work the user will not notice if it is delayed
    BestEffort,
    /// Work whose result is visible to the user, but not immediately blocking
    #[default]
    UserVisible,
    /// Work the user is actively waiting on
    UserBlocking,
}

impl TaskPriority {
    /// All priorities from highest to lowest
    pub const HIGHEST_FIRST: [TaskPriority; 3] = [
        TaskPriority::UserBlocking,
        TaskPriority::UserVisible,
        TaskPriority::BestEffort,
    ];

    pub(crate) fn band(self) -> usize {
        match self {
            TaskPriority::UserBlocking => 0,
            TaskPriority::UserVisible => 1,
            TaskPriority::BestEffort => 2,
        }
    }
}

/// What happens to a pending task when the engine shuts down
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TaskShutdownBehavior {
    /// May still be running when shutdown completes; shutdown does not wait.
    /// Not started once shutdown has begun.
    ContinueOnShutdown,
    /// Discarded if not started when shutdown begins; shutdown waits for
    /// instances that already started.
    #[default]
    SkipOnShutdown,
    /// Shutdown waits until every posted instance has run.
    BlockShutdown,
}

/// Immutable configuration attached to every posted task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TaskTraits {
    priority: TaskPriority,
    shutdown_behavior: TaskShutdownBehavior,
    may_block: bool,
}

impl TaskTraits {
    /// Traits with default priority and shutdown behavior, not allowed to block
    pub const fn new() -> Self {
        Self {
            priority: TaskPriority::UserVisible,
            shutdown_behavior: TaskShutdownBehavior::SkipOnShutdown,
            may_block: false,
        }
    }

    /// Start building traits
    pub fn builder() -> TaskTraitsBuilder {
        TaskTraitsBuilder::default()
    }

    /// Task priority
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Shutdown behavior
    pub fn shutdown_behavior(&self) -> TaskShutdownBehavior {
        self.shutdown_behavior
    }

    /// Whether tasks may enter a blocking call
    pub fn may_block(&self) -> bool {
        self.may_block
    }

    pub(crate) fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Traits actually applied to a task posted with a delay.
    ///
    /// A delayed task cannot block shutdown before it is due, so
    /// `BlockShutdown` becomes `SkipOnShutdown`.
    pub(crate) fn for_delayed_task(mut self) -> Self {
        if self.shutdown_behavior == TaskShutdownBehavior::BlockShutdown {
            self.shutdown_behavior = TaskShutdownBehavior::SkipOnShutdown;
        }
        self
    }
}

impl From<TaskPriority> for TaskTraits {
    fn from(priority: TaskPriority) -> Self {
        TaskTraits::new().with_priority(priority)
    }
}

impl From<TaskShutdownBehavior> for TaskTraits {
    fn from(shutdown_behavior: TaskShutdownBehavior) -> Self {
        TaskTraits {
            shutdown_behavior,
            ..TaskTraits::new()
        }
    }
}

/// Builder for [`TaskTraits`]
///
/// Setting a property twice with different values is a contract violation.
#[derive(Debug, Default)]
pub struct TaskTraitsBuilder {
    priority: Option<TaskPriority>,
    shutdown_behavior: Option<TaskShutdownBehavior>,
    may_block: bool,
}

impl TaskTraitsBuilder {
    /// Set the priority
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        match self.priority {
            Some(existing) if existing != priority => contract_violation!(
                "conflicting task priorities: {:?} and {:?}",
                existing,
                priority
            ),
            _ => self.priority = Some(priority),
        }
        self
    }

    /// Set the shutdown behavior
    pub fn shutdown_behavior(mut self, behavior: TaskShutdownBehavior) -> Self {
        match self.shutdown_behavior {
            Some(existing) if existing != behavior => contract_violation!(
                "conflicting shutdown behaviors: {:?} and {:?}",
                existing,
                behavior
            ),
            _ => self.shutdown_behavior = Some(behavior),
        }
        self
    }

    /// Allow tasks to enter blocking calls
    pub fn may_block(mut self) -> Self {
        self.may_block = true;
        self
    }

    /// Finish building
    pub fn build(self) -> TaskTraits {
        TaskTraits {
            priority: self.priority.unwrap_or_default(),
            shutdown_behavior: self.shutdown_behavior.unwrap_or_default(),
            may_block: self.may_block,
        }
    }
}
