//! Background scheduler driving periodic sync cycles.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollRate {
    Off,
    Slow,
    #[default]
    Default,
}

impl fmt::Display for PollRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollRate::Off => write!(f, "off"),
            PollRate::Slow => write!(f, "slow"),
            PollRate::Default => write!(f, "default"),
        }
    }
}

impl FromStr for PollRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(PollRate::Off),
            "slow" => Ok(PollRate::Slow),
            "default" => Ok(PollRate::Default),
            _ => Err(format!(
                "Invalid poll rate '{}'. Valid options: off, slow, default",
                s
            )),
        }
    }
}

/// Concrete tick intervals for each poll rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub slow: Duration,
    pub default: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            slow: Duration::from_secs(60),
            default: Duration::from_secs(6),
        }
    }
}

impl PollIntervals {
    pub fn interval(&self, rate: PollRate) -> Option<Duration> {
        match rate {
            PollRate::Off => None,
            PollRate::Slow => Some(self.slow),
            PollRate::Default => Some(self.default),
        }
    }
}

/// Produces the future for one tick, or `None` once the owner is gone.
pub type TickFn = Box<dyn Fn() -> Option<BoxFuture<'static, ()>> + Send + Sync>;

/// Spawn the poll loop.
///
/// The loop ticks every interval of the current rate, or early when `wake` is
/// notified. While the rate is `Off` it only waits for the rate to change. It
/// exits when the rate sender is dropped or `tick` returns `None`. An in-flight
/// tick is never aborted.
pub fn spawn(
    intervals: PollIntervals,
    mut rate: watch::Receiver<PollRate>,
    wake: Arc<Notify>,
    tick: TickFn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let current = *rate.borrow_and_update();
            let Some(interval) = intervals.interval(current) else {
                if rate.changed().await.is_err() {
                    break;
                }
                continue;
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wake.notified() => {}
                changed = rate.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    tracing::debug!("Poll rate changed");
                    continue;
                }
            }

            match tick() {
                Some(cycle) => cycle.await,
                None => break,
            }
        }
        tracing::debug!("Poller stopped");
    })
}
