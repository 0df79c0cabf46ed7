//! Operator control surface: observe the queue and force transitions.
//!
//! Callers are trusted; authentication belongs to whatever transport sits in
//! front of this.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::QueueError;
use crate::queue::EnrichmentQueue;
use crate::record::JobRecord;
use crate::store::StatusCounts;

/// Result of [`ControlSurface::query`].
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub stats: StatusCounts,
    /// Records stuck in `processing` under the configured timeout.
    pub stuck: Vec<JobRecord>,
}

/// An operator request. Exactly one of `job_id`, `all` and `reset` must be
/// set; `force` is only meaningful with `job_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

/// A validated [`TriggerRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    EnqueueOne(String),
    /// Move a stuck `processing` record back to `pending`.
    RequeueStuck(String),
    EnqueueAll,
    ResetFailed,
}

impl TriggerRequest {
    pub fn enqueue(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            all: Some(true),
            ..Default::default()
        }
    }

    pub fn reset() -> Self {
        Self {
            reset: Some(true),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<TriggerAction, QueueError> {
        let all = self.all.unwrap_or(false);
        let reset = self.reset.unwrap_or(false);
        let force = self.force.unwrap_or(false);

        let selected = [self.job_id.is_some(), all, reset]
            .iter()
            .filter(|set| **set)
            .count();
        if selected != 1 {
            return Err(QueueError::Validation(
                "exactly one of jobId, all or reset must be set".to_string(),
            ));
        }

        if let Some(id) = &self.job_id {
            let id = id.trim();
            if id.is_empty() {
                return Err(QueueError::Validation("jobId must not be empty".to_string()));
            }
            return Ok(if force {
                TriggerAction::RequeueStuck(id.to_string())
            } else {
                TriggerAction::EnqueueOne(id.to_string())
            });
        }

        if force {
            return Err(QueueError::Validation(
                "force is only valid together with jobId".to_string(),
            ));
        }

        Ok(if all {
            TriggerAction::EnqueueAll
        } else {
            TriggerAction::ResetFailed
        })
    }
}

/// What a trigger did, followed by the queue stats after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TriggerResponse {
    Queued { queued: usize, stats: StatusCounts },
    Reset { reset: usize, stats: StatusCounts },
    Stats { stats: StatusCounts },
}

impl TriggerResponse {
    pub fn stats(&self) -> &StatusCounts {
        match self {
            Self::Queued { stats, .. } | Self::Reset { stats, .. } | Self::Stats { stats } => stats,
        }
    }
}

pub struct ControlSurface {
    queue: EnrichmentQueue,
    stuck_timeout: Duration,
}

impl ControlSurface {
    pub fn new(queue: EnrichmentQueue, stuck_timeout: Duration) -> Self {
        Self {
            queue,
            stuck_timeout,
        }
    }

    pub fn query(&self) -> Result<QueueSnapshot, QueueError> {
        Ok(QueueSnapshot {
            stats: self.queue.stats()?,
            stuck: self.queue.stuck_jobs(self.stuck_timeout)?,
        })
    }

    pub fn trigger(&self, request: &TriggerRequest) -> Result<TriggerResponse, QueueError> {
        let action = request.validate()?;
        info!(?action, "Operator trigger");

        match action {
            TriggerAction::EnqueueOne(id) => {
                self.queue.enqueue_one(&id)?;
            }
            TriggerAction::RequeueStuck(id) => {
                self.queue.requeue_stuck(&id, self.stuck_timeout)?;
            }
            TriggerAction::EnqueueAll => {
                let queued = self.queue.enqueue_all_unenriched()?;
                return Ok(TriggerResponse::Queued {
                    queued,
                    stats: self.queue.stats()?,
                });
            }
            TriggerAction::ResetFailed => {
                let reset = self.queue.reset_failed()?;
                return Ok(TriggerResponse::Reset {
                    reset,
                    stats: self.queue.stats()?,
                });
            }
        }

        Ok(TriggerResponse::Stats {
            stats: self.queue.stats()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::record::{EnrichmentStatus, Posting};
    use crate::store::{MemoryStore, RecordStore};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn request(value: serde_json::Value) -> TriggerRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_table() {
        let cases = vec![
            (json!({"jobId": "j1"}), Ok(TriggerAction::EnqueueOne("j1".into()))),
            (
                json!({"jobId": "j1", "force": true}),
                Ok(TriggerAction::RequeueStuck("j1".into())),
            ),
            (json!({"all": true}), Ok(TriggerAction::EnqueueAll)),
            (json!({"reset": true}), Ok(TriggerAction::ResetFailed)),
            (json!({"all": true, "reset": false}), Ok(TriggerAction::EnqueueAll)),
            (json!({}), Err(())),
            (json!({"all": false}), Err(())),
            (json!({"all": true, "reset": true}), Err(())),
            (json!({"jobId": "j1", "all": true}), Err(())),
            (json!({"jobId": "  "}), Err(())),
            (json!({"all": true, "force": true}), Err(())),
        ];

        for (input, expected) in cases {
            let result = request(input.clone()).validate();
            match expected {
                Ok(action) => assert_eq!(result.unwrap(), action, "input: {}", input),
                Err(()) => {
                    let err = result.unwrap_err();
                    assert_eq!(err.kind(), ErrorKind::Validation, "input: {}", input);
                }
            }
        }
    }

    fn surface(count: usize) -> (MemoryStore, Arc<ManualClock>, ControlSurface) {
        let store = MemoryStore::new();
        for i in 0..count {
            let record = JobRecord::new(
                "board",
                None,
                Posting {
                    company: format!("Company {}", i),
                    title: "Engineer".to_string(),
                    ..Default::default()
                },
                Utc::now(),
            );
            store.insert(&record).unwrap();
        }
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_767_225_600, 0).unwrap()));
        let queue = EnrichmentQueue::with_clock(Arc::new(store.clone()), clock.clone());
        (store, clock, ControlSurface::new(queue, Duration::from_secs(300)))
    }

    #[test]
    fn test_trigger_all_then_reset() {
        let (store, _clock, surface) = surface(3);

        let response = surface.trigger(&TriggerRequest::all()).unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap()["queued"],
            json!(3)
        );
        assert_eq!(response.stats().pending, 3);

        let queue = EnrichmentQueue::new(Arc::new(store.clone()));
        for record in queue.claim_batch(3).unwrap() {
            queue.complete_failure(&record.id, "boom").unwrap();
        }

        let response = surface.trigger(&TriggerRequest::reset()).unwrap();
        match response {
            TriggerResponse::Reset { reset, stats } => {
                assert_eq!(reset, 3);
                assert_eq!(stats.pending, 3);
                assert_eq!(stats.failed, 0);
            }
            other => panic!("expected reset response, got {:?}", other),
        }
    }

    #[test]
    fn test_trigger_job_id_missing_record() {
        let (_store, _clock, surface) = surface(0);
        let err = surface.trigger(&TriggerRequest::enqueue("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_query_and_force_requeue() {
        let (store, clock, surface) = surface(1);
        let id = store
            .list_by_status(EnrichmentStatus::Unenriched, None)
            .unwrap()[0]
            .id
            .clone();

        let response = surface.trigger(&TriggerRequest::enqueue(&id)).unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"stats": serde_json::to_value(response.stats()).unwrap()})
        );

        let queue = EnrichmentQueue::with_clock(Arc::new(store.clone()), clock.clone());
        queue.claim_batch(1).unwrap();

        let forced = TriggerRequest {
            force: Some(true),
            ..TriggerRequest::enqueue(&id)
        };
        let err = surface.trigger(&forced).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(surface.query().unwrap().stuck.is_empty());

        clock.advance(chrono::Duration::seconds(301));
        let snapshot = surface.query().unwrap();
        assert_eq!(snapshot.stuck.len(), 1);
        assert_eq!(snapshot.stats.processing, 1);

        let response = surface.trigger(&forced).unwrap();
        assert_eq!(response.stats().pending, 1);
        assert_eq!(response.stats().processing, 0);
    }
}
