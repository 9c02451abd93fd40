//! Organization and room persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{new_id, status_column, Store, StoreResult};
use crate::domain::{Organization, Room, RoomStatus};

/// Fields required to register a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub external_room_id: String,
    pub name: String,
    pub organization_id: String,
}

const ROOM_COLUMNS: &str =
    "id, external_room_id, name, status, organization_id, created_at, ended_at";

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    let status: String = row.get(3)?;
    Ok(Room {
        id: row.get(0)?,
        external_room_id: row.get(1)?,
        name: row.get(2)?,
        status: status_column(3, RoomStatus::parse(&status))?,
        organization_id: row.get(4)?,
        created_at: row.get(5)?,
        ended_at: row.get(6)?,
    })
}

impl Store {
    pub async fn insert_organization(&self, org: &Organization) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO organizations (id, name, email, owner_user_id) VALUES (?1, ?2, ?3, ?4)",
            params![org.id, org.name, org.email, org.owner_user_id],
        )?;
        Ok(())
    }

    pub async fn get_organization(&self, id: &str) -> StoreResult<Option<Organization>> {
        let conn = self.conn.lock().await;
        let org = conn
            .query_row(
                "SELECT id, name, email, owner_user_id FROM organizations WHERE id = ?1",
                [id],
                |row| {
                    Ok(Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        owner_user_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(org)
    }

    /// Register a new ACTIVE room
    pub async fn create_room(&self, new: NewRoom) -> StoreResult<Room> {
        let room = Room {
            id: new_id(),
            external_room_id: new.external_room_id,
            name: new.name,
            status: RoomStatus::Active,
            organization_id: new.organization_id,
            created_at: Utc::now(),
            ended_at: None,
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO rooms (id, external_room_id, name, status, organization_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                room.id,
                room.external_room_id,
                room.name,
                room.status.as_str(),
                room.organization_id,
                room.created_at
            ],
        )?;

        Ok(room)
    }

    pub async fn get_room(&self, id: &str) -> StoreResult<Option<Room>> {
        let conn = self.conn.lock().await;
        let room = conn
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"),
                [id],
                room_from_row,
            )
            .optional()?;
        Ok(room)
    }

    /// Look up a room by its media platform name
    pub async fn find_room_by_external_id(&self, external_room_id: &str) -> StoreResult<Option<Room>> {
        let conn = self.conn.lock().await;
        let room = conn
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE external_room_id = ?1"),
                [external_room_id],
                room_from_row,
            )
            .optional()?;
        Ok(room)
    }

    /// ACTIVE → ENDED. Returns false if the room was not ACTIVE.
    pub async fn end_room(&self, room_id: &str, ended_at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE rooms SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                RoomStatus::Ended.as_str(),
                ended_at,
                room_id,
                RoomStatus::Active.as_str()
            ],
        )?;
        Ok(changed == 1)
    }
}
