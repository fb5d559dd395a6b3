//! Domain model (ids, job references, tasks, attempts, decisions, events).

pub mod attempt;
pub mod decision;
pub mod events;
pub mod ids;
pub mod job;
pub mod task;

pub use attempt::AttemptRecord;
pub use decision::Decision;
pub use events::TaskEvent;
pub use ids::{RunId, TaskId};
pub use job::{JobName, JobOutput, JobRef};
pub use task::{DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY, Task, TaskStatus};
