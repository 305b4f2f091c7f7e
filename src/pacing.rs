//! Pacing governor: self-imposed politeness between outbound requests.
//!
//! The API strategy calls `wait` before every network request. Two rules
//! combine: a randomized minimum spacing since the previous call, and a
//! rolling 60-second cap on total calls. State lives for the process only.
//!
//! Timing goes through `tokio::time` so tests run under paused time.

use crate::config::PolitenessConfig;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Rolling window for the requests-per-minute cap.
const WINDOW: Duration = Duration::from_secs(60);

/// Safety margin added when sleeping out the remainder of the window.
const WINDOW_SLACK: Duration = Duration::from_millis(25);

/// Enforces inter-request spacing and the requests-per-minute cap.
#[derive(Debug)]
pub struct PacingGovernor {
    min_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    requests_per_minute: u32,
    last: Option<Instant>,
    window: VecDeque<Instant>,
}

impl PacingGovernor {
    pub fn new(cfg: &PolitenessConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(cfg.min_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms.max(cfg.min_delay_ms)),
            jitter: Duration::from_millis(cfg.jitter_ms),
            requests_per_minute: cfg.requests_per_minute,
            last: None,
            window: VecDeque::new(),
        }
    }

    /// Await the right to issue the next request.
    pub async fn wait(&mut self) {
        let base = {
            let mut rng = rand::thread_rng();
            let spacing = rng.gen_range(self.min_delay.as_millis()..=self.max_delay.as_millis());
            let jitter = rng.gen_range(0..=self.jitter.as_millis());
            Duration::from_millis((spacing + jitter) as u64)
        };

        if let Some(last) = self.last {
            let since = last.elapsed();
            if since < base {
                tokio::time::sleep(base - since).await;
            }
        }
        self.last = Some(Instant::now());

        if self.requests_per_minute > 0 {
            while self
                .window
                .front()
                .is_some_and(|t| t.elapsed() >= WINDOW)
            {
                self.window.pop_front();
            }
            if self.window.len() >= self.requests_per_minute as usize {
                if let Some(earliest) = self.window.front() {
                    let remaining = WINDOW.saturating_sub(earliest.elapsed()) + WINDOW_SLACK;
                    tokio::time::sleep(remaining).await;
                }
            }
            self.window.push_back(Instant::now());
        }
    }
}

/// Consecutive-failure budget for the pagination loop.
///
/// A success anywhere resets the counter; the budget is exhausted once the
/// count exceeds the configured maximum.
#[derive(Debug)]
pub struct ErrorBudget {
    max_consecutive: u32,
    consecutive: u32,
}

impl ErrorBudget {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive,
            consecutive: 0,
        }
    }

    pub fn success(&mut self) {
        self.consecutive = 0;
    }

    /// Record one failure. Returns true once the budget is exhausted.
    pub fn failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive > self.max_consecutive
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }
}
