//! Advisory spacing between calls to globally rate-limited upstreams.
//!
//! Callers check `can_call` and record successful calls. Ignoring the
//! throttle is allowed; it only risks upstream 429s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use wayfarer_core::ThrottleConfig;

use crate::connectivity::ConnectivityMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleBucket {
    CurrentWeather,
    Alerts,
    Places,
    Narrative,
}

impl ThrottleBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "current_weather",
            Self::Alerts => "alerts",
            Self::Places => "places",
            Self::Narrative => "narrative",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiThrottle {
    intervals: HashMap<ThrottleBucket, Duration>,
    last_call: Arc<Mutex<HashMap<ThrottleBucket, Instant>>>,
    connectivity: ConnectivityMonitor,
}

impl ApiThrottle {
    pub fn new(config: &ThrottleConfig, connectivity: ConnectivityMonitor) -> Self {
        let intervals = HashMap::from([
            (
                ThrottleBucket::CurrentWeather,
                Duration::from_secs(config.current_weather_secs),
            ),
            (ThrottleBucket::Alerts, Duration::from_secs(config.alerts_secs)),
            (ThrottleBucket::Places, Duration::from_secs(config.places_secs)),
            (
                ThrottleBucket::Narrative,
                Duration::from_secs(config.narrative_secs),
            ),
        ]);
        Self {
            intervals,
            last_call: Arc::new(Mutex::new(HashMap::new())),
            connectivity,
        }
    }

    pub fn with_interval(mut self, bucket: ThrottleBucket, interval: Duration) -> Self {
        self.intervals.insert(bucket, interval);
        self
    }

    pub fn interval(&self, bucket: ThrottleBucket) -> Duration {
        self.intervals.get(&bucket).copied().unwrap_or_default()
    }

    /// False while offline or while the bucket's interval has not elapsed.
    pub fn can_call(&self, bucket: ThrottleBucket) -> bool {
        if self.connectivity.is_offline() {
            return false;
        }
        self.retry_after(bucket).is_none()
    }

    /// Remaining wait before the bucket opens, ignoring connectivity.
    pub fn retry_after(&self, bucket: ThrottleBucket) -> Option<Duration> {
        let last = self.last_call.lock().get(&bucket).copied()?;
        let interval = self.interval(bucket);
        let elapsed = last.elapsed();
        if elapsed >= interval {
            None
        } else {
            Some(interval - elapsed)
        }
    }

    pub fn record_call(&self, bucket: ThrottleBucket) {
        self.last_call.lock().insert(bucket, Instant::now());
        tracing::debug!("Recorded call for throttle bucket {}", bucket.as_str());
    }
}
