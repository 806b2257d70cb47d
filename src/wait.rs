// Copyright 2026 The OpenEBS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded, fixed-interval waits on external conditions.
//!
//! A wait never blocks open-ended: it checks at most `retries + 1` times and
//! then reports [`WaitOutcome::ExhaustedRetries`] so the plugin client can
//! retry the outer call. Cancellation is observed between attempts only.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub retries: u32,
}

impl WaitPolicy {
    pub const fn new(interval: Duration, retries: u32) -> Self {
        Self { interval, retries }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    ExhaustedRetries,
    Cancelled,
}

/// Wait budgets for every condition the plugin polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub reachable: WaitPolicy,
    pub ready: WaitPolicy,
    pub config_bound: WaitPolicy,
    pub resize: WaitPolicy,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reachable: WaitPolicy::new(Duration::from_secs(2), 6),
            ready: WaitPolicy::new(Duration::from_secs(2), 6),
            config_bound: WaitPolicy::new(Duration::from_secs(10), 1),
            resize: WaitPolicy::new(Duration::from_secs(2), 3),
        }
    }
}

impl Timing {
    /// Same retry budgets with no sleeping in between.
    pub fn immediate() -> Self {
        let defaults = Self::default();
        let zero = |p: WaitPolicy| WaitPolicy::new(Duration::ZERO, p.retries);
        Self {
            reachable: zero(defaults.reachable),
            ready: zero(defaults.ready),
            config_bound: zero(defaults.config_bound),
            resize: zero(defaults.resize),
        }
    }
}

/// Runs `check` until it yields a value, the retry budget is spent, or
/// `cancel` fires. `check` receives the attempt number, starting at 0.
pub async fn poll<T, E, F, Fut>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<WaitOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 0..=policy.retries {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }
        if let Some(value) = check(attempt).await? {
            return Ok(WaitOutcome::Ready(value));
        }
        if attempt == policy.retries {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
    Ok(WaitOutcome::ExhaustedRetries)
}
