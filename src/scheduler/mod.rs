//! Parallel work infrastructure of marking: the task queues workers push to and steal from, the
//! termination protocol and the worker group that runs a task on all active workers.

pub mod task;
pub mod task_queue;
pub mod terminator;
pub mod worker;

pub use task::{ArrayChunk, MarkTask};
pub use task_queue::{ObjToScanQueue, QueueOwner, TaskQueueSet};
pub use terminator::{TaskTerminator, TerminatorTerminator};
pub use worker::{GCTask, WorkerGroup};
