//! The execution entity: a duel/elimination event from the side mechanic.
//!
//! The engine stores and lists executions for the adjacent duel mechanic;
//! they never feed into chapter tallying.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One elimination event attached to a quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Opaque identity.
    pub id: Uuid,
    /// The quest the duel ran under.
    pub quest_id: Uuid,
    /// The eliminated participant.
    pub user_id: String,
    /// Which side of the duel the participant was on.
    pub side: String,
    /// The roast delivered at elimination.
    pub roast_text: String,
    /// Link to the tombstone artifact, set once the participant is out.
    pub tombstone_url: Option<String>,
    /// When the elimination happened.
    pub created_at: DateTime<Utc>,
}
