//! Enrichment status machine.
//!
//! [`EnrichmentStatus::can_transition_to`] is the single edge table; every
//! constructor of a new [`Enrichment`] state goes through it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EnrichedFields;

/// Where a record sits in the enrichment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    /// Inserted by the scraper, not yet queued.
    Unenriched,
    /// Eligible for claim.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Provider output stored.
    Enriched,
    /// Last attempt failed; terminal until reset.
    Failed,
}

impl EnrichmentStatus {
    pub const ALL: [EnrichmentStatus; 5] = [
        Self::Unenriched,
        Self::Pending,
        Self::Processing,
        Self::Enriched,
        Self::Failed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unenriched => "unenriched",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Enriched => "enriched",
            Self::Failed => "failed",
        }
    }

    /// Returns true if `next` is reachable from `self` in one step.
    ///
    /// `Processing -> Pending` is the operator recovery edge for stuck
    /// records; workers never take it.
    pub const fn can_transition_to(self, next: EnrichmentStatus) -> bool {
        use EnrichmentStatus::*;
        matches!(
            (self, next),
            (Unenriched, Pending)
                | (Pending, Processing)
                | (Processing, Enriched)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown enrichment status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for EnrichmentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// An edge missing from the status table.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Illegal enrichment transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: EnrichmentStatus,
    pub to: EnrichmentStatus,
}

/// The enrichment sub-record of a job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub status: EnrichmentStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_fields: Option<EnrichedFields>,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            status: EnrichmentStatus::Unenriched,
            attempts: 0,
            last_attempt_at: None,
            enriched_at: None,
            last_error: None,
            enriched_fields: None,
        }
    }
}

impl Enrichment {
    fn advance(&self, to: EnrichmentStatus) -> Result<Self, TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        Ok(Self {
            status: to,
            ..self.clone()
        })
    }

    /// `unenriched | failed -> pending`. Clears any previous error.
    pub fn enqueue(&self) -> Result<Self, TransitionError> {
        if self.status == EnrichmentStatus::Processing {
            return Err(TransitionError {
                from: self.status,
                to: EnrichmentStatus::Pending,
            });
        }
        let mut next = self.advance(EnrichmentStatus::Pending)?;
        next.last_error = None;
        Ok(next)
    }

    /// `pending -> processing`, counting the attempt.
    pub fn claim(&self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        let mut next = self.advance(EnrichmentStatus::Processing)?;
        next.attempts = next.attempts.saturating_add(1);
        next.last_attempt_at = Some(now);
        Ok(next)
    }

    /// `processing -> enriched`.
    pub fn succeed(
        &self,
        fields: EnrichedFields,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        let mut next = self.advance(EnrichmentStatus::Enriched)?;
        next.enriched_fields = Some(fields);
        next.enriched_at = Some(now);
        next.last_error = None;
        Ok(next)
    }

    /// `processing -> failed`.
    pub fn fail(&self, reason: impl Into<String>) -> Result<Self, TransitionError> {
        let mut next = self.advance(EnrichmentStatus::Failed)?;
        next.last_error = Some(reason.into());
        next.enriched_fields = None;
        Ok(next)
    }

    /// `processing -> pending`, the operator override for stuck claims.
    pub fn requeue(&self) -> Result<Self, TransitionError> {
        if self.status != EnrichmentStatus::Processing {
            return Err(TransitionError {
                from: self.status,
                to: EnrichmentStatus::Pending,
            });
        }
        self.advance(EnrichmentStatus::Pending)
    }

    /// A claim older than `timeout` with no completion. The boundary itself
    /// is not stuck.
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == EnrichmentStatus::Processing
            && self
                .last_attempt_at
                .is_some_and(|claimed_at| now - claimed_at > timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in EnrichmentStatus::ALL {
            assert_eq!(status.as_str().parse::<EnrichmentStatus>(), Ok(status));
        }
        assert!("done".parse::<EnrichmentStatus>().is_err());
    }

    #[test]
    fn test_edge_table() {
        use EnrichmentStatus::*;
        assert!(Unenriched.can_transition_to(Pending));
        assert!(!Unenriched.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Enriched));
        assert!(!Enriched.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
        assert!(Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_full_success_path() {
        let fresh = Enrichment::default();
        let pending = fresh.enqueue().unwrap();
        let processing = pending.claim(at(0)).unwrap();
        assert_eq!(processing.attempts, 1);
        assert_eq!(processing.last_attempt_at, Some(at(0)));

        let done = processing.succeed(json!({"seniority": "senior"}), at(5)).unwrap();
        assert_eq!(done.status, EnrichmentStatus::Enriched);
        assert_eq!(done.enriched_at, Some(at(5)));
        assert!(done.last_error.is_none());
        assert_eq!(done.attempts, 1);
    }

    #[test]
    fn test_failure_then_retry_clears_error() {
        let failed = Enrichment::default()
            .enqueue()
            .unwrap()
            .claim(at(0))
            .unwrap()
            .fail("timeout")
            .unwrap();
        assert_eq!(failed.last_error.as_deref(), Some("timeout"));

        let requeued = failed.enqueue().unwrap();
        assert_eq!(requeued.status, EnrichmentStatus::Pending);
        assert!(requeued.last_error.is_none());

        let second = requeued.claim(at(10)).unwrap();
        assert_eq!(second.attempts, 2);
    }

    #[test]
    fn test_enqueue_rejects_processing() {
        let processing = Enrichment::default().enqueue().unwrap().claim(at(0)).unwrap();
        let err = processing.enqueue().unwrap_err();
        assert_eq!(err.from, EnrichmentStatus::Processing);
    }

    #[test]
    fn test_claim_requires_pending() {
        let err = Enrichment::default().claim(at(0)).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: EnrichmentStatus::Unenriched,
                to: EnrichmentStatus::Processing,
            }
        );
    }

    #[test]
    fn test_requeue_only_from_processing() {
        assert!(Enrichment::default().requeue().is_err());
        let processing = Enrichment::default().enqueue().unwrap().claim(at(0)).unwrap();
        let back = processing.requeue().unwrap();
        assert_eq!(back.status, EnrichmentStatus::Pending);
        assert_eq!(back.attempts, 1);
    }

    #[test]
    fn test_is_stuck_is_strict() {
        let processing = Enrichment::default().enqueue().unwrap().claim(at(0)).unwrap();
        let timeout = Duration::seconds(60);
        assert!(!processing.is_stuck(at(59), timeout));
        assert!(!processing.is_stuck(at(60), timeout));
        assert!(processing.is_stuck(at(61), timeout));
        assert!(!Enrichment::default().is_stuck(at(1_000), timeout));
    }
}
