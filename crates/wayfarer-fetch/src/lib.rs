//! Resilience primitives shared by every Wayfarer fetcher.
//!
//! - `connectivity`: process-wide online/offline state
//! - `throttle`: minimum spacing between calls to rate-limited upstreams
//! - `rotation`: endpoint failover with per-attempt timeouts and backoff
//! - `dedup`: one in-flight operation per request fingerprint
//! - `fingerprint`: cache and dedup key discipline
//! - `runtime`: the context object bundling all of the above with the cache

pub mod connectivity;
pub mod dedup;
pub mod fingerprint;
pub mod resolved;
pub mod rotation;
pub mod runtime;
pub mod throttle;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use dedup::{DedupError, RequestDeduplicator};
pub use fingerprint::{check_coordinates, coord_key, round_coord, Fingerprint};
pub use resolved::{DataSource, Resolved};
pub use rotation::{
    AttemptRecord, BackoffPolicy, Endpoint, EndpointRotation, EndpointSet, RequestDescriptor,
    RotationError, RotationOutcome,
};
pub use runtime::FetchRuntime;
pub use throttle::{ApiThrottle, ThrottleBucket};
