use chrono::{DateTime, Utc};
use kubert::lease::Claim;
use std::sync::Arc;
use tokio::sync::watch;

/// Reports whether this process currently holds the write lease.
#[derive(Clone, Debug)]
pub struct Leader {
    claims: watch::Receiver<Arc<Claim>>,
    claimant: Arc<str>,
}

impl Leader {
    pub fn new(claims: watch::Receiver<Arc<Claim>>, claimant: impl Into<Arc<str>>) -> Self {
        Self {
            claims,
            claimant: claimant.into(),
        }
    }

    /// A claim that never expires, used when leader election is disabled.
    pub fn local(claimant: impl Into<Arc<str>>) -> Self {
        let claimant = claimant.into();
        let claim = Claim {
            holder: claimant.to_string(),
            expiry: DateTime::<Utc>::MAX_UTC,
        };
        let (_, claims) = watch::channel(Arc::new(claim));
        Self { claims, claimant }
    }

    pub fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.claimant)
    }

    pub fn claimant(&self) -> &str {
        &self.claimant
    }
}
