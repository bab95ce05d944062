//! Inter-batch delay control.
//!
//! With a fixed delay the pacer is a pass-through. With a target latency it runs a damped
//! controller on the sign of `latency - target` of each write:
//!
//! ```text
//! latency > target:  delay' = max(delay - (latency - target) / 2, 0)
//! latency < target:  delay' = delay + (target - latency - delay) / 2   while below target - latency
//! ```
//!
//! A below-target sample never lowers the delay; once the delay reaches `target - latency`
//! it holds there. Under a stable endpoint latency `L` the delay approaches `target - L`
//! geometrically, so the round trip `L + delay` settles at the target. The delay never
//! exceeds `MAX_DELAY_FACTOR * target`.

use crate::config::Pacing;
use std::time::Duration;

const MAX_DELAY_FACTOR: u32 = 10;

/// Per-worker pacing state.
#[derive(Debug, Clone)]
pub struct Pacer {
    pacing: Pacing,
    delay: Duration,
}

impl Pacer {
    pub fn new(pacing: Pacing) -> Self {
        let delay = match pacing {
            Pacing::Fixed(delay) => delay,
            Pacing::Adaptive { target, initial } => initial.min(max_delay(target)),
        };
        Self { pacing, delay }
    }

    /// Delay to sleep before the next batch.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Feeds the latency of the last write and returns the delay before the next one.
    pub fn observe_write(&mut self, latency: Duration) -> Duration {
        if let Pacing::Adaptive { target, .. } = self.pacing {
            self.delay = step(self.delay, latency, target);
        }
        self.delay
    }
}

fn max_delay(target: Duration) -> Duration {
    target.saturating_mul(MAX_DELAY_FACTOR)
}

/// Half of `d`, rounded up to the next nanosecond so every non-zero error moves the delay.
fn half_up(d: Duration) -> Duration {
    let half = d / 2;
    if half * 2 < d {
        half + Duration::from_nanos(1)
    } else {
        half
    }
}

/// One controller transition.
pub fn step(delay: Duration, latency: Duration, target: Duration) -> Duration {
    let next = if latency > target {
        delay.saturating_sub(half_up(latency - target))
    } else if latency < target {
        let ceiling = target - latency;
        if delay < ceiling {
            delay + half_up(ceiling - delay)
        } else {
            delay
        }
    } else {
        delay
    };
    next.min(max_delay(target))
}
