use crate::redact::{ConfidentialityLevel, Redacted};
use secrecy::{ExposeSecret, SecretString};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// A Vault token together with its validity window.
///
/// Leases are shared as `Arc<Lease>` and never modified once built; a renewal
/// produces a new lease.
#[derive(Debug, Clone)]
pub struct Lease {
    pub token: SecretString,
    pub accessor: String,
    pub policies: BTreeSet<String>,
    pub created_at: Instant,
    /// Zero means the token never expires.
    pub lease_duration: Duration,
    pub renewable: bool,
    pub entity_id: String,
    pub token_type: Option<String>,
    pub orphan: bool,
    pub metadata: HashMap<String, String>,
}

impl Lease {
    pub fn new(token: impl Into<String>, lease_duration: Duration, renewable: bool) -> Self {
        Self {
            token: SecretString::from(token.into()),
            accessor: String::new(),
            policies: BTreeSet::new(),
            created_at: Instant::now(),
            lease_duration,
            renewable,
            entity_id: String::new(),
            token_type: None,
            orphan: false,
            metadata: HashMap::new(),
        }
    }

    /// Configured bearer token: no expiry, no renewal.
    pub fn static_token(token: SecretString) -> Self {
        Self {
            token,
            ..Self::new(String::new(), Duration::ZERO, false)
        }
    }

    pub fn unbounded(&self) -> bool {
        self.lease_duration.is_zero()
    }

    /// `None` for an unbounded lease, or when the expiry is past what the
    /// clock can represent.
    pub fn expires_at(&self) -> Option<Instant> {
        if self.unbounded() {
            None
        } else {
            self.created_at.checked_add(self.lease_duration)
        }
    }

    /// Point at which renewal should be attempted.
    ///
    /// A grace period at least as long as the lease would put this at or before
    /// creation; in that case the midpoint of the lease is used instead.
    pub fn renew_at(&self, grace: Duration) -> Option<Instant> {
        let expires_at = self.expires_at()?;
        if grace < self.lease_duration {
            Some(expires_at - grace)
        } else {
            Some(self.created_at + self.lease_duration / 2)
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|expires_at| now >= expires_at)
    }

    pub fn needs_renewal(&self, now: Instant, grace: Duration) -> bool {
        self.renewable
            && !self.expired(now)
            && self.renew_at(grace).is_some_and(|renew_at| now >= renew_at)
    }

    /// Time left before expiry. `Duration::MAX` for an unbounded lease.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.expires_at() {
            Some(expires_at) => expires_at.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    pub fn same_token(&self, other: &Lease) -> bool {
        self.token.expose_secret() == other.token.expose_secret()
    }

    /// Order by creation time, for use with `sort_by`. Not an `Ord` impl
    /// since equality is by token.
    pub fn creation_order(&self, other: &Lease) -> Ordering {
        self.created_at.cmp(&other.created_at)
    }

    /// One-line summary with the token rendered at `level`.
    pub fn describe(&self, level: ConfidentialityLevel) -> LeaseSummary<'_> {
        LeaseSummary { lease: self, level }
    }
}

impl PartialEq for Lease {
    fn eq(&self, other: &Self) -> bool {
        self.same_token(other)
    }
}

impl Eq for Lease {}

pub struct LeaseSummary<'a> {
    lease: &'a Lease,
    level: ConfidentialityLevel,
}

impl fmt::Display for LeaseSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lease = self.lease;
        write!(
            f,
            "token={} accessor={} policies=[{}] lease_duration={}s renewable={}",
            Redacted::new(lease.token.expose_secret(), self.level),
            lease.accessor,
            lease.policies.iter().cloned().collect::<Vec<_>>().join(","),
            lease.lease_duration.as_secs(),
            lease.renewable,
        )
    }
}
