//! Conversation and participant persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::{json, Value};

use super::{json_column, new_id, status_column, Store, StoreError, StoreResult};
use crate::domain::{Conversation, ConversationStatus, Participant};

/// Fields required to open a conversation
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub room_id: String,
    pub metadata: Value,
}

impl NewConversation {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            metadata: json!({}),
        }
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, room_id, start_time, end_time, status, participant_count, metadata, transcribed_at";

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let status: String = row.get(4)?;
    Ok(Conversation {
        id: row.get(0)?,
        room_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        status: status_column(4, ConversationStatus::parse(&status))?,
        participant_count: row.get(5)?,
        metadata: json_column(6, row.get(6)?)?,
        transcribed_at: row.get(7)?,
    })
}

const PARTICIPANT_COLUMNS: &str =
    "id, conversation_id, external_identity, name, joined_at, left_at";

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        external_identity: row.get(2)?,
        name: row.get(3)?,
        joined_at: row.get(4)?,
        left_at: row.get(5)?,
    })
}

impl Store {
    /// Open a RECORDING conversation.
    ///
    /// Fails with [`StoreError::Conflict`] while the room already has an open
    /// conversation (one with no end time).
    pub async fn create_conversation(&self, new: NewConversation) -> StoreResult<Conversation> {
        let conversation = Conversation {
            id: new_id(),
            room_id: new.room_id,
            start_time: Utc::now(),
            end_time: None,
            status: ConversationStatus::Recording,
            participant_count: 0,
            metadata: new.metadata,
            transcribed_at: None,
        };

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let open: Option<String> = tx
            .query_row(
                "SELECT id FROM conversations WHERE room_id = ?1 AND end_time IS NULL LIMIT 1",
                [&conversation.room_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(open_id) = open {
            return Err(StoreError::Conflict(format!(
                "Room {} already has open conversation {}",
                conversation.room_id, open_id
            )));
        }

        tx.execute(
            "INSERT INTO conversations (id, room_id, start_time, status, participant_count, metadata)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                conversation.id,
                conversation.room_id,
                conversation.start_time,
                conversation.status.as_str(),
                serde_json::to_string(&conversation.metadata)?
            ],
        )?;
        tx.commit()?;

        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn.lock().await;
        let conversation = conn
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                [id],
                conversation_from_row,
            )
            .optional()?;
        Ok(conversation)
    }

    /// The room's open conversation: most recent with no end time
    pub async fn find_open_conversation(&self, room_id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn.lock().await;
        let conversation = conn
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE room_id = ?1 AND end_time IS NULL
                     ORDER BY start_time DESC LIMIT 1"
                ),
                [room_id],
                conversation_from_row,
            )
            .optional()?;
        Ok(conversation)
    }

    /// Most recent RECORDING conversation of a room
    pub async fn find_recording_conversation(
        &self,
        room_id: &str,
    ) -> StoreResult<Option<Conversation>> {
        let conn = self.conn.lock().await;
        let conversation = conn
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE room_id = ?1 AND status = ?2
                     ORDER BY start_time DESC LIMIT 1"
                ),
                params![room_id, ConversationStatus::Recording.as_str()],
                conversation_from_row,
            )
            .optional()?;
        Ok(conversation)
    }

    pub async fn list_conversations(
        &self,
        room_id: &str,
        status: ConversationStatus,
    ) -> StoreResult<Vec<Conversation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE room_id = ?1 AND status = ?2 ORDER BY start_time"
        ))?;
        let rows = stmt
            .query_map(params![room_id, status.as_str()], conversation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Bulk RECORDING → PROCESSING for every recording conversation of a room
    pub async fn finish_recording_conversations(
        &self,
        room_id: &str,
        end_time: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE conversations SET status = ?1, end_time = ?2
             WHERE room_id = ?3 AND status = ?4",
            params![
                ConversationStatus::Processing.as_str(),
                end_time,
                room_id,
                ConversationStatus::Recording.as_str()
            ],
        )?;
        Ok(changed)
    }

    /// Conditional RECORDING → PROCESSING; true only for the caller that won
    pub async fn mark_conversation_processing(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE conversations SET status = ?1, end_time = COALESCE(end_time, ?2)
             WHERE id = ?3 AND status = ?4",
            params![
                ConversationStatus::Processing.as_str(),
                end_time,
                id,
                ConversationStatus::Recording.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    /// → COMPLETED, only if a transcript exists for the conversation
    pub async fn mark_conversation_completed(
        &self,
        id: &str,
        transcribed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE conversations
             SET status = ?1, transcribed_at = ?2, end_time = COALESCE(end_time, ?2)
             WHERE id = ?3
               AND EXISTS (SELECT 1 FROM transcripts WHERE conversation_id = ?3)",
            params![ConversationStatus::Completed.as_str(), transcribed_at, id],
        )?;
        Ok(changed == 1)
    }

    /// → FAILED unless already COMPLETED
    pub async fn mark_conversation_failed(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE conversations SET status = ?1, end_time = COALESCE(end_time, ?2)
             WHERE id = ?3 AND status != ?4",
            params![
                ConversationStatus::Failed.as_str(),
                Utc::now(),
                id,
                ConversationStatus::Completed.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    /// Append an entry to `metadata.interactions` and stamp `lastInteractionAt`
    pub async fn append_interaction(
        &self,
        conversation_id: &str,
        interaction: Value,
        timestamp: Value,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let raw: String = tx
            .query_row(
                "SELECT metadata FROM conversations WHERE id = ?1",
                [conversation_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", conversation_id)))?;

        let mut metadata: Value = serde_json::from_str(&raw).unwrap_or_else(|_| json!({}));
        if !metadata.is_object() {
            metadata = json!({});
        }
        if !metadata["interactions"].is_array() {
            metadata["interactions"] = json!([]);
        }
        if let Some(list) = metadata["interactions"].as_array_mut() {
            list.push(interaction);
        }
        metadata["lastInteractionAt"] = timestamp;

        tx.execute(
            "UPDATE conversations SET metadata = ?1 WHERE id = ?2",
            params![serde_json::to_string(&metadata)?, conversation_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Record a participant unless the identity is already known in the
    /// conversation. Returns the participant and whether it was created.
    pub async fn add_participant_if_absent(
        &self,
        conversation_id: &str,
        identity: &str,
        name: &str,
        joined_at: DateTime<Utc>,
    ) -> StoreResult<(Participant, bool)> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants
                     WHERE conversation_id = ?1 AND external_identity = ?2"
                ),
                params![conversation_id, identity],
                participant_from_row,
            )
            .optional()?;
        if let Some(participant) = existing {
            return Ok((participant, false));
        }

        let participant = Participant {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            external_identity: identity.to_string(),
            name: name.to_string(),
            joined_at,
            left_at: None,
        };
        tx.execute(
            "INSERT INTO participants (id, conversation_id, external_identity, name, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                participant.id,
                participant.conversation_id,
                participant.external_identity,
                participant.name,
                participant.joined_at
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET participant_count = participant_count + 1 WHERE id = ?1",
            [conversation_id],
        )?;
        tx.commit()?;

        Ok((participant, true))
    }

    /// Set `left_at` on the open participant record; no match is a no-op
    pub async fn mark_participant_left(
        &self,
        conversation_id: &str,
        identity: &str,
        left_at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE participants SET left_at = ?1
             WHERE conversation_id = ?2 AND external_identity = ?3 AND left_at IS NULL",
            params![left_at, conversation_id, identity],
        )?;
        Ok(changed)
    }

    pub async fn list_participants(&self, conversation_id: &str) -> StoreResult<Vec<Participant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants
             WHERE conversation_id = ?1 ORDER BY joined_at"
        ))?;
        let rows = stmt
            .query_map([conversation_id], participant_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::store_with_room;

    #[tokio::test]
    async fn test_only_one_open_conversation_per_room() {
        let (store, room) = store_with_room().await;

        let first = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();
        let err = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Once the first one ends, a new conversation may start
        assert!(store
            .mark_conversation_processing(&first.id, Utc::now())
            .await
            .unwrap());
        let second = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();

        let open = store.find_open_conversation(&room.id).await.unwrap().unwrap();
        assert_eq!(open.id, second.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_processing_transition_wins_once() {
        let (store, room) = store_with_room().await;
        let conversation = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            store.mark_conversation_processing(&conversation.id, Utc::now()),
            store.mark_conversation_processing(&conversation.id, Utc::now()),
        );
        assert_eq!([a.unwrap(), b.unwrap()].iter().filter(|won| **won).count(), 1);
        assert!(!store
            .mark_conversation_processing(&conversation.id, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_completed_requires_transcript() {
        let (store, room) = store_with_room().await;
        let conversation = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();

        assert!(!store
            .mark_conversation_completed(&conversation.id, Utc::now())
            .await
            .unwrap());
        let reloaded = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ConversationStatus::Recording);
    }

    #[tokio::test]
    async fn test_failed_does_not_override_completed() {
        let (store, room) = store_with_room().await;
        let conversation = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();

        assert!(store.mark_conversation_failed(&conversation.id).await.unwrap());
        let reloaded = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ConversationStatus::Failed);
        assert!(reloaded.end_time.is_some());
    }

    #[tokio::test]
    async fn test_participant_dedup_and_count() {
        let (store, room) = store_with_room().await;
        let conversation = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();

        let (alice, created) = store
            .add_participant_if_absent(&conversation.id, "alice", "Alice", Utc::now())
            .await
            .unwrap();
        assert!(created);
        let (again, created) = store
            .add_participant_if_absent(&conversation.id, "alice", "Alice", Utc::now())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, alice.id);

        let reloaded = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.participant_count, 1);
    }

    #[tokio::test]
    async fn test_participant_left_is_update_many() {
        let (store, room) = store_with_room().await;
        let conversation = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();
        store
            .add_participant_if_absent(&conversation.id, "bob", "Bob", Utc::now())
            .await
            .unwrap();

        assert_eq!(
            store
                .mark_participant_left(&conversation.id, "bob", Utc::now())
                .await
                .unwrap(),
            1
        );
        // Already left, and unknown identities, are silent no-ops
        assert_eq!(
            store
                .mark_participant_left(&conversation.id, "bob", Utc::now())
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .mark_participant_left(&conversation.id, "carol", Utc::now())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_append_interaction() {
        let (store, room) = store_with_room().await;
        let conversation = store
            .create_conversation(NewConversation::new(&room.id))
            .await
            .unwrap();

        store
            .append_interaction(
                &conversation.id,
                json!({ "speaker": "agent", "text": "Hello" }),
                json!(1700000000000i64),
            )
            .await
            .unwrap();
        store
            .append_interaction(
                &conversation.id,
                json!({ "speaker": "customer", "text": "Hi" }),
                json!(1700000001000i64),
            )
            .await
            .unwrap();

        let reloaded = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.metadata["interactions"].as_array().unwrap().len(), 2);
        assert_eq!(reloaded.metadata["lastInteractionAt"], json!(1700000001000i64));
    }
}
