//! Offline mutation replay: the persisted queue and the connectivity
//! monitor that triggers its drain on reconnect.

mod monitor;
mod queue;

pub use monitor::ConnectivityMonitor;
pub use queue::{DrainOutcome, OfflineQueue, QueueItem, QueueOp, MAX_RETRIES};
