pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod results;
pub mod scan;

pub use config::{EncodingMode, ScanConfig, ScanRequest};
pub use errors::{ScanError, ScanResult};
pub use results::{AggregateSnapshot, FileOutcome, ScanSummary};
pub use scan::{run_scan, CancelToken, ProgressSink, ScanCoordinator, ScanState};
