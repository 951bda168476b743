//! Append-only audit trail of lifecycle transitions.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Actor, OrderId, ScheduleStatus, StatusGroup};

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// One recorded transition. Events are appended on every status change and
/// never mutated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: String,
    pub order: OrderId,
    pub status: ScheduleStatus,
    pub group: StatusGroup,
    pub actor: Actor,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn record(
        order: &OrderId,
        status: ScheduleStatus,
        actor: Actor,
        description: impl Into<String>,
    ) -> Self {
        let sequence = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("evt-{sequence:08}"),
            order: order.clone(),
            status,
            group: status.group(),
            actor,
            description: description.into(),
            recorded_at: Utc::now(),
        }
    }
}
