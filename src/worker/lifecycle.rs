use crate::config::worker::Worker as WorkerConfig;
use crate::worker::processor::{IterationHook, LoopControl};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const LIFETIME_JITTER: f64 = 0.1;

/// Decides after each loop iteration whether the worker should stop: on a shutdown signal, or
/// once its (jittered) lifetime has run out and dying is allowed.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    deadline: Option<DateTime<Utc>>,
    allow_die: Arc<AtomicBool>,
    cancellation_token: CancellationToken,
}

impl Lifecycle {
    pub fn new(config: &WorkerConfig, cancellation_token: CancellationToken) -> Self {
        let deadline = config.lifetime.and_then(|lifetime| {
            let deadline = jittered_deadline(Utc::now(), lifetime, &mut rand::rng());
            if deadline.is_none() {
                warn!(?lifetime, "Worker lifetime is out of range; running without a deadline");
            }
            deadline
        });
        if let Some(deadline) = deadline {
            info!("I will die at {}", deadline.format("%Y-%m-%d %H:%M:%S"));
        }
        Self {
            deadline,
            allow_die: Arc::new(AtomicBool::new(config.allow_die)),
            cancellation_token,
        }
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Allow or prevent stopping at the deadline. Clones of this lifecycle share the flag.
    pub fn set_allow_die(&self, allow_die: bool) {
        self.allow_die.store(allow_die, Ordering::SeqCst);
    }

    pub fn allow_die(&self) -> bool {
        self.allow_die.load(Ordering::SeqCst)
    }

    pub fn check(&self, now: DateTime<Utc>) -> LoopControl {
        if self.cancellation_token.is_cancelled() {
            info!("Shutdown requested. Shutting down.");
            return LoopControl::Terminate;
        }
        match self.deadline {
            Some(deadline) if now >= deadline && self.allow_die() => {
                info!("I worked enough. Shutting down.");
                LoopControl::Terminate
            }
            _ => LoopControl::Continue,
        }
    }
}

impl IterationHook for Lifecycle {
    fn after_iteration(&mut self) -> LoopControl {
        self.check(Utc::now())
    }
}

/// `start + lifetime`, moved by a random amount of at most 10% of `lifetime` either way. `None` if
/// the result is past the latest representable date.
pub fn jittered_deadline<R>(
    start: DateTime<Utc>,
    lifetime: Duration,
    rng: &mut R,
) -> Option<DateTime<Utc>>
where
    R: Rng,
{
    let lifetime = lifetime.as_secs_f64();
    let jitter = rng.random_range(-LIFETIME_JITTER..=LIFETIME_JITTER) * lifetime;
    // Float-to-int casts saturate, so a huge lifetime becomes i64::MAX here.
    let millis = ((lifetime + jitter) * 1000.0).round() as i64;
    TimeDelta::try_milliseconds(millis).and_then(|offset| start.checked_add_signed(offset))
}

/// Cancel `cancellation_token` on ctrl-c, SIGTERM or SIGHUP.
pub async fn cancel_on_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = unix_signal(tokio::signal::unix::SignalKind::terminate(), "SIGTERM");
    #[cfg(unix)]
    let sighup = unix_signal(tokio::signal::unix::SignalKind::hangup(), "SIGHUP");

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();
    #[cfg(not(unix))]
    let sighup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Stopping after the current job due to ctrl-c signal received");
        },
        _ = sigterm => {
            info!("Stopping after the current job due to sigterm signal received");
        },
        _ = sighup => {
            info!("Stopping after the current job due to sighup signal received");
        },
        _ = cancellation_token.cancelled() => {
            return;
        }
    }
    cancellation_token.cancel();
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(err) => {
            error!("Failed to install {name} handler: {err}");
            std::future::pending::<()>().await;
        }
    }
}
