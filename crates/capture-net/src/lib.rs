//! # capture-net
//!
//! Network side of the capture queue: reachability and the two remote
//! collaborators (object storage upload, document field update).

pub mod documents;
pub mod error;
pub mod probe;
pub mod reachability;
pub mod upload;

mod http;

pub use documents::{FieldUpdater, HttpFieldUpdater};
pub use error::NetError;
pub use probe::{HttpProbe, Probe, ProbeConfig};
pub use reachability::{ReachabilityMonitor, Subscription};
pub use upload::{HttpUploadClient, UploadClient};
