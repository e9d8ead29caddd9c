//! Token lifecycle: login, renewal ahead of expiry, recovery after failures.
//!
//! The manager is a small state machine guarded by one mutex:
//!
//! ```text
//! Unstarted ──► Refreshing ──► Valid ──(renew window / expiry)──► Refreshing
//!                   │                                                │
//!                   └──────────────► Failed ◄────────────────────────┘
//! ```
//!
//! At most one refresh (login or renew-self) runs at a time. It is spawned as
//! its own task and exposed as a shared future, so every caller that arrives
//! while it is running waits on the same outcome, and a caller giving up on
//! its deadline does not cancel it.

use super::LeaseSource;
use crate::VaultError;
use crate::config::{AuthConfig, DEFAULT_RENEW_GRACE_PERIOD, DEFAULT_RETRY_INTERVAL};
use crate::lease::Lease;
use crate::redact::{self, ConfidentialityLevel};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Initial backoff after a failed login.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff after repeated failed logins.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Lower bound for the delay before retrying a failed renewal.
const MIN_RENEWAL_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    /// Renew this long before the lease expires.
    pub renew_grace_period: Duration,
    /// Upper bound for the delay before retrying a failed renewal.
    pub retry_interval: Duration,
    pub confidentiality: ConfidentialityLevel,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            renew_grace_period: DEFAULT_RENEW_GRACE_PERIOD,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            confidentiality: ConfidentialityLevel::default(),
        }
    }
}

impl From<&AuthConfig> for TokenManagerConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            renew_grace_period: config.renew_grace_period,
            retry_interval: config.retry_interval,
            confidentiality: config.log_confidentiality_level,
        }
    }
}

type Flight = Shared<BoxFuture<'static, Result<Arc<Lease>, VaultError>>>;

enum State {
    Unstarted,
    Valid {
        lease: Arc<Lease>,
        /// Set after a transient renewal failure.
        retry_renewal_at: Option<Instant>,
    },
    Refreshing(Flight),
    Failed {
        error: VaultError,
        retry_at: Instant,
    },
    Closed,
}

struct Slot {
    state: State,
    /// Bumped on every refresh start and on invalidation. A refresh installs
    /// its outcome only if the generation it started with is still current.
    generation: u64,
    /// Consecutive failed logins.
    failures: u32,
}

enum Step {
    Ready(Arc<Lease>),
    Fail(VaultError),
    Join(Flight),
    Start { renew: Option<Arc<Lease>> },
}

enum Refresh {
    LoggedIn(Lease),
    Renewed(Lease),
    /// Renewal failed transiently; the old lease is still good.
    Deferred {
        lease: Arc<Lease>,
        error: VaultError,
    },
    Failed(VaultError),
}

enum Wake {
    At(Instant),
    Idle,
    Stop,
}

struct Inner {
    source: Arc<dyn LeaseSource>,
    config: TokenManagerConfig,
    slot: Mutex<Slot>,
    changed: Notify,
}

/// Keeps a valid Vault token available to any number of concurrent callers.
pub struct TokenManager {
    inner: Arc<Inner>,
    renewer: Mutex<Option<JoinHandle<()>>>,
}

impl TokenManager {
    /// Create an idle manager; the first login happens on the first
    /// [`current_token`](Self::current_token) call.
    ///
    /// Must be called from within a Tokio runtime: the background renewer is
    /// spawned here.
    pub fn new(source: Arc<dyn LeaseSource>, config: TokenManagerConfig) -> Self {
        let inner = Arc::new(Inner {
            source,
            config,
            slot: Mutex::new(Slot {
                state: State::Unstarted,
                generation: 0,
                failures: 0,
            }),
            changed: Notify::new(),
        });

        let renewer = tokio::spawn(renewal_loop(Arc::clone(&inner)));

        Self {
            inner,
            renewer: Mutex::new(Some(renewer)),
        }
    }

    /// Return a token that is not expired at the time of the call.
    pub async fn current_token(&self) -> Result<SecretString, VaultError> {
        Ok(self.current_lease().await?.token.clone())
    }

    /// Like [`current_token`](Self::current_token), but give up with
    /// [`VaultError::Timeout`] after `deadline`. A refresh already in flight
    /// keeps running for the next caller.
    pub async fn current_token_within(
        &self,
        deadline: Duration,
    ) -> Result<SecretString, VaultError> {
        tokio::time::timeout(deadline, self.current_token())
            .await
            .map_err(|_| VaultError::Timeout)?
    }

    pub async fn current_lease(&self) -> Result<Arc<Lease>, VaultError> {
        self.inner.acquire().await
    }

    /// Drop the current lease so the next call logs in again. Also clears a
    /// sticky failure. No-op for a static token.
    pub async fn invalidate(&self) {
        if !self.inner.source.performs_login() {
            return;
        }

        {
            let mut slot = self.inner.slot.lock().await;
            if matches!(slot.state, State::Closed) {
                return;
            }
            slot.generation += 1;
            slot.failures = 0;
            slot.state = State::Unstarted;
        }

        tracing::debug!("Vault token invalidated");
        self.inner.changed.notify_one();
    }

    /// Stop the background renewer. Waits for an in-flight refresh to finish;
    /// afterwards every call fails with [`VaultError::Closed`].
    pub async fn close(&self) {
        let in_flight = {
            let mut slot = self.inner.slot.lock().await;
            match std::mem::replace(&mut slot.state, State::Closed) {
                State::Refreshing(flight) => Some(flight),
                _ => None,
            }
        };
        self.inner.changed.notify_one();

        if let Some(flight) = in_flight {
            let _ = flight.await;
        }

        if let Some(renewer) = self.renewer.lock().await.take() {
            renewer.abort();
            let _ = renewer.await;
        }

        tracing::debug!("Token manager closed");
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        if let Some(renewer) = self.renewer.get_mut().take() {
            renewer.abort();
        }
    }
}

impl Inner {
    async fn acquire(self: &Arc<Self>) -> Result<Arc<Lease>, VaultError> {
        let flight = {
            let mut slot = self.slot.lock().await;
            match self.next_step(&slot.state, Instant::now()) {
                Step::Ready(lease) => return Ok(lease),
                Step::Fail(error) => return Err(error),
                Step::Join(flight) => flight,
                Step::Start { renew } => self.start_refresh(&mut slot, renew),
            }
        };
        flight.await
    }

    fn next_step(&self, state: &State, now: Instant) -> Step {
        let grace = self.config.renew_grace_period;
        match state {
            State::Closed => Step::Fail(VaultError::Closed),
            State::Unstarted => Step::Start { renew: None },
            State::Refreshing(flight) => Step::Join(flight.clone()),
            State::Failed { error, retry_at } if now < *retry_at => Step::Fail(error.clone()),
            State::Failed { .. } => Step::Start { renew: None },
            State::Valid { lease, .. } if lease.expired(now) => Step::Start { renew: None },
            State::Valid {
                lease,
                retry_renewal_at,
            } if lease.needs_renewal(now, grace) && retry_renewal_at.is_none_or(|at| now >= at) => {
                Step::Start {
                    renew: Some(Arc::clone(lease)),
                }
            }
            State::Valid { lease, .. } => Step::Ready(Arc::clone(lease)),
        }
    }

    fn start_refresh(self: &Arc<Self>, slot: &mut Slot, renew: Option<Arc<Lease>>) -> Flight {
        slot.generation += 1;
        let generation = slot.generation;

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.refresh(generation, renew).await });
        let flight = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(VaultError::Closed),
                Err(e) => Err(VaultError::Network(format!("token refresh task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        slot.state = State::Refreshing(flight.clone());
        flight
    }

    async fn refresh(
        self: Arc<Self>,
        generation: u64,
        renew: Option<Arc<Lease>>,
    ) -> Result<Arc<Lease>, VaultError> {
        let outcome = match renew {
            Some(lease) => match self.source.renew(&lease).await {
                Ok(renewed) => Refresh::Renewed(renewed),
                Err(error) if error.is_transient() => Refresh::Deferred { lease, error },
                Err(error) => {
                    tracing::info!(
                        error = %self.scrub(&error, &lease),
                        "Token renewal rejected, logging in again"
                    );
                    self.login().await
                }
            },
            None => self.login().await,
        };

        self.install(generation, outcome).await
    }

    async fn login(&self) -> Refresh {
        match self.source.login().await {
            Ok(lease) => Refresh::LoggedIn(lease),
            Err(error) => Refresh::Failed(error),
        }
    }

    async fn install(&self, generation: u64, outcome: Refresh) -> Result<Arc<Lease>, VaultError> {
        let level = self.config.confidentiality;
        let now = Instant::now();
        let mut slot = self.slot.lock().await;
        let current = slot.generation == generation && matches!(slot.state, State::Refreshing(_));

        let result = match outcome {
            Refresh::LoggedIn(lease) | Refresh::Renewed(lease) if !current => Ok(Arc::new(lease)),
            Refresh::LoggedIn(lease) => {
                let lease = Arc::new(lease);
                tracing::info!(lease = %lease.describe(level), "Obtained Vault token");
                slot.state = State::Valid {
                    lease: Arc::clone(&lease),
                    retry_renewal_at: None,
                };
                slot.failures = 0;
                Ok(lease)
            }
            Refresh::Renewed(lease) => {
                let lease = Arc::new(lease);
                tracing::debug!(lease = %lease.describe(level), "Vault token renewed");
                slot.state = State::Valid {
                    lease: Arc::clone(&lease),
                    retry_renewal_at: None,
                };
                Ok(lease)
            }
            Refresh::Deferred { lease, error } => {
                let delay = (self.config.retry_interval.min(lease.remaining(now)) / 2)
                    .max(MIN_RENEWAL_RETRY);
                tracing::warn!(
                    error = %self.scrub(&error, &lease),
                    retry_in = ?delay,
                    "Token renewal failed, keeping current token"
                );
                if current {
                    slot.state = State::Valid {
                        lease: Arc::clone(&lease),
                        retry_renewal_at: Some(now + delay),
                    };
                }
                Ok(lease)
            }
            Refresh::Failed(error) => {
                if current {
                    slot.failures += 1;
                    let delay = self.failure_delay(&error, slot.failures);
                    if error.is_transient() {
                        tracing::warn!(error = %error, backoff = ?delay, "Vault login failed, will retry");
                    } else {
                        tracing::error!(error = %error, hold = ?delay, "Vault login failed");
                    }
                    slot.state = State::Failed {
                        error: error.clone(),
                        retry_at: now + delay,
                    };
                }
                Err(error)
            }
        };

        drop(slot);
        self.changed.notify_one();
        result
    }

    /// Exponential backoff for transient failures; anything else is held for
    /// the grace period.
    fn failure_delay(&self, error: &VaultError, failures: u32) -> Duration {
        if error.is_transient() {
            let exponent = failures.saturating_sub(1).min(5);
            (INITIAL_BACKOFF * 2u32.pow(exponent)).min(MAX_BACKOFF)
        } else {
            self.config.renew_grace_period
        }
    }

    fn scrub(&self, error: &VaultError, lease: &Lease) -> String {
        redact::scrub(
            &error.to_string(),
            lease.token.expose_secret(),
            self.config.confidentiality,
        )
    }

    async fn next_wake(&self) -> Wake {
        let slot = self.slot.lock().await;
        match &slot.state {
            State::Closed => Wake::Stop,
            State::Valid {
                lease,
                retry_renewal_at,
            } if lease.renewable => match lease.renew_at(self.config.renew_grace_period) {
                Some(renew_at) => Wake::At(retry_renewal_at.map_or(renew_at, |at| at.max(renew_at))),
                None => Wake::Idle,
            },
            _ => Wake::Idle,
        }
    }
}

async fn renewal_loop(inner: Arc<Inner>) {
    loop {
        match inner.next_wake().await {
            Wake::Stop => break,
            Wake::Idle => inner.changed.notified().await,
            Wake::At(at) => {
                tokio::select! {
                    () = tokio::time::sleep_until(at) => {
                        if let Err(e) = inner.acquire().await {
                            tracing::debug!(error = %e, "Background token refresh failed");
                        }
                    }
                    () = inner.changed.notified() => {}
                }
            }
        }
    }
}
