//! Per-handler invocation rate limits.
//!
//! A limit is written `calls/period`, where the period is a count and
//! a unit: `2/s`, `1/10s`, `10/m`, `3/h`. A handler may carry several
//! limits; an invocation must fit inside every window or it is
//! rejected.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AgentError;

/// One `calls/period` rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub calls: u32,
    pub period: Duration,
}

impl RateLimit {
    pub fn new(calls: u32, period: Duration) -> Self {
        Self { calls, period }
    }
}

fn parse_period(text: &str) -> Option<Duration> {
    let text = text.trim().to_lowercase();
    let (count, unit) = text.split_at(text.len().checked_sub(1)?);
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return None,
    };
    let base: u64 = if count.trim().is_empty() {
        1
    } else {
        count.trim().parse().ok()?
    };
    Some(Duration::from_secs(base * multiplier))
}

impl FromStr for RateLimit {
    type Err = AgentError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || AgentError::InvalidRateLimit(text.to_owned());
        let (calls, period) = text.split_once('/').ok_or_else(invalid)?;
        let calls: u32 = calls.trim().parse().map_err(|_| invalid())?;
        if calls == 0 {
            return Err(invalid());
        }
        let period = parse_period(period).ok_or_else(invalid)?;
        Ok(Self { calls, period })
    }
}

impl std::fmt::Display for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.calls, self.period.as_secs())
    }
}

/// Sliding-window guard over one or more limits.
///
/// Uses the tokio clock so paused-time tests behave.
pub(crate) struct RateLimiter {
    windows: Mutex<Vec<(RateLimit, VecDeque<Instant>)>>,
}

impl RateLimiter {
    pub(crate) fn new(limits: impl IntoIterator<Item = RateLimit>) -> Self {
        Self {
            windows: Mutex::new(
                limits
                    .into_iter()
                    .map(|limit| (limit, VecDeque::new()))
                    .collect(),
            ),
        }
    }

    /// Records an invocation, or returns the violated limit.
    ///
    /// Nothing is recorded on rejection, so a rejected call does not
    /// consume budget.
    pub(crate) fn try_acquire(&self) -> Result<(), RateLimit> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        for (limit, hits) in windows.iter_mut() {
            while hits
                .front()
                .is_some_and(|t| now.duration_since(*t) >= limit.period)
            {
                hits.pop_front();
            }
            if hits.len() >= limit.calls as usize {
                return Err(*limit);
            }
        }
        for (_, hits) in windows.iter_mut() {
            hits.push_back(now);
        }
        Ok(())
    }
}
