//! The concurrent scan pipeline.
//!
//! [`PathEnumerator`] walks the tree and feeds a [`WorkerPool`], whose workers
//! run a [`MatchTask`] per file and deliver each [`FileOutcome`] into a bounded
//! result channel. The [`ScanCoordinator`] drains that channel on its own
//! thread, folds outcomes into an [`Aggregator`], and reports to a
//! [`ProgressSink`].
//!
//! [`FileOutcome`]: crate::results::FileOutcome

pub mod aggregator;
pub mod channel;
pub mod coordinator;
pub mod enumerator;
pub mod matcher;
pub mod pool;
pub mod sink;

pub use aggregator::Aggregator;
pub use channel::{result_channel, ResultSender, ResultStream};
pub use coordinator::{run_scan, CancelToken, ScanCoordinator, ScanState};
pub use enumerator::PathEnumerator;
pub use matcher::{MatchTask, PatternMatcher};
pub use pool::{Submitter, WorkerPool};
pub use sink::{ChannelSink, MemorySink, ProgressSink, ScanEvent};
