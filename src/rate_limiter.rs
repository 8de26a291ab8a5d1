use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use log::debug;

/// Sliding-window limiter that spaces out calls to the generation API
#[derive(Clone)]
pub struct RateLimiter {
    limit: Option<RateLimit>,
    state: Arc<Mutex<VecDeque<Instant>>>,
}

#[derive(Clone, Copy)]
struct RateLimit {
    requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Allows `requests` calls per `window`; zero requests disables limiting
    pub fn new(requests: usize, window: Duration) -> Self {
        let limit = (requests > 0 && !window.is_zero()).then_some(RateLimit { requests, window });
        Self {
            limit,
            state: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Limiter for a per-minute budget
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests as usize, Duration::from_secs(60))
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Acquires a permit, waiting until the window has room
    pub async fn acquire(&self) {
        let Some(limit) = self.limit else {
            return;
        };

        loop {
            let mut requests = self.state.lock().await;

            // Remove expired timestamps
            let now = Instant::now();
            while let Some(&oldest) = requests.front() {
                if now.duration_since(oldest) >= limit.window {
                    requests.pop_front();
                } else {
                    break;
                }
            }

            if requests.len() < limit.requests {
                requests.push_back(now);
                return;
            }

            let wait = requests
                .front()
                .map(|&oldest| limit.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(limit.window);
            drop(requests);
            debug!("Rate limit reached, waiting {:?}", wait);
            sleep(wait.max(Duration::from_millis(10))).await;
        }
    }
}
