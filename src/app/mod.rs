//! The running tool: CLI surface, job queue, watch mode and the top-level run.

pub mod cli;
pub mod events;
pub mod queue;
pub mod tasks;
pub mod watch;

pub use cli::Cli;
pub use events::{Listener, QueueEvent};
pub use queue::{Job, JobFn, JobQueue, JobState};
pub use tasks::{run, run_until, RunSummary};
