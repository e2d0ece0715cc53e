//! Database module for the swap market
//!
//! SQLite-backed item repository: users, items, views, favorites,
//! proposals and ratings. Every mutation runs in a single transaction and
//! uniqueness is left to table constraints.

mod schema;

pub use schema::*;

use crate::catalog::Category;
use crate::geo::{haversine_km, GeoPoint};
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),
}

pub type DbResult<T> = Result<T, DbError>;

const ITEM_COLUMNS: &str = "id, owner_id, category, title, description, price, photo, lat, lon, \
     location_label, views, status, created_at, updated_at";

const USER_COLUMNS: &str =
    "id, display_name, phone, lat, lon, location_label, reputation, total_swaps, created_at";

const PROPOSAL_SELECT: &str = "SELECT p.id, p.liked_item_id, li.title, p.proposer_item_id, pi.title,
            p.proposer_id, p.target_id, p.message, p.status, p.created_at, p.responded_at
     FROM proposals p
     JOIN items li ON li.id = p.liked_item_id
     JOIN items pi ON pi.id = p.proposer_item_id";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        register_functions(&conn)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== User Operations ====================

    /// Fetch a user, creating the record on first contact
    pub fn get_or_create_user(&self, id: UserId, display_name: &str) -> DbResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)",
            params![id, display_name, Utc::now().to_rfc3339()],
        )?;
        query_user(&conn, id)?.ok_or(DbError::UserNotFound(id))
    }

    pub fn get_user(&self, id: UserId) -> DbResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        query_user(&conn, id)
    }

    pub fn update_user_location(&self, id: UserId, point: GeoPoint, label: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET lat = ?2, lon = ?3, location_label = ?4 WHERE id = ?1",
            params![id, point.lat, point.lon, label],
        )?;
        if updated == 0 {
            return Err(DbError::UserNotFound(id));
        }
        Ok(())
    }

    pub fn update_user_field(&self, id: UserId, field: UserField, value: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        // Column names come from a closed enum, never from input
        let sql = format!("UPDATE users SET {} = ?2 WHERE id = ?1", field.column());
        let updated = conn.execute(&sql, params![id, value])?;
        if updated == 0 {
            return Err(DbError::UserNotFound(id));
        }
        Ok(())
    }

    // ==================== Item Operations ====================

    pub fn create_item(&self, item: &NewItem) -> DbResult<ItemId> {
        let conn = self.conn.lock().unwrap();
        if !exists(&conn, "users", item.owner_id)? {
            return Err(DbError::UserNotFound(item.owner_id));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO items (owner_id, category, title, description, price, photo, lat, lon,
                                location_label, views, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 'active', ?10, ?10)",
            params![
                item.owner_id,
                item.category.key(),
                item.title,
                item.description,
                item.price.map(|p| p as i64),
                item.photo,
                item.location.map(|p| p.lat),
                item.location.map(|p| p.lon),
                item.location_label,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_item(&self, id: ItemId) -> DbResult<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
        conn.query_row(&sql, params![id], parse_item_row)
            .optional()
            .map_err(DbError::from)
    }

    /// Items owned by a user, newest first. Deleted items are never listed.
    pub fn get_user_items(&self, owner_id: UserId, active_only: bool) -> DbResult<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE owner_id = ?1 AND status != 'deleted' AND (?2 = 0 OR status = 'active')
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, active_only], parse_item_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Toggle an item between active and inactive
    pub fn set_item_active(&self, id: ItemId, active: bool) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let status = if active {
            ItemStatus::Active
        } else {
            ItemStatus::Inactive
        };
        let updated = conn.execute(
            "UPDATE items SET status = ?2, updated_at = ?3
             WHERE id = ?1 AND status IN ('active', 'inactive')",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(DbError::ItemNotFound(id));
        }
        Ok(())
    }

    /// Next browsable item after the cursor.
    ///
    /// Items sort on `(distance, id)`. With an origin, items outside
    /// `max_distance_km` are dropped; items without coordinates are kept and
    /// sort before every located item, as does everything when there is no
    /// origin. The cursor item's own sort key is the lower bound, so a walk
    /// visits every candidate exactly once whatever the id order.
    pub fn next_candidate(&self, query: &CandidateQuery) -> DbResult<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "WITH bound AS (
                 SELECT COALESCE(haversine_km(?4, ?5, lat, lon), -1.0) AS distance, id
                 FROM items WHERE id = ?3
             )
             SELECT {ITEM_COLUMNS}, COALESCE(haversine_km(?4, ?5, lat, lon), -1.0) AS sort_distance
             FROM items
             WHERE status = 'active' AND category = ?1 AND owner_id != ?2
               AND (?4 IS NULL OR lat IS NULL OR lon IS NULL
                    OR haversine_km(?4, ?5, lat, lon) <= ?6)
               AND NOT EXISTS (
                   SELECT 1 FROM bound b
                   WHERE COALESCE(haversine_km(?4, ?5, items.lat, items.lon), -1.0) < b.distance
                      OR (COALESCE(haversine_km(?4, ?5, items.lat, items.lon), -1.0) = b.distance
                          AND items.id <= b.id)
               )
             ORDER BY sort_distance, id
             LIMIT 1"
        );
        conn.query_row(
            &sql,
            params![
                query.category.key(),
                query.viewer_id,
                query.cursor,
                query.origin.map(|p| p.lat),
                query.origin.map(|p| p.lon),
                query.max_distance_km,
            ],
            parse_item_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Record that `viewer_id` was shown the item.
    ///
    /// Returns `true` only the first time for a given pair; the view counter
    /// moves in the same transaction as the dedup insert.
    pub fn record_view(&self, item_id: ItemId, viewer_id: UserId) -> DbResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if !exists(&tx, "items", item_id)? {
            return Err(DbError::ItemNotFound(item_id));
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO item_views (item_id, viewer_id, viewed_at) VALUES (?1, ?2, ?3)",
            params![item_id, viewer_id, Utc::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            tx.execute(
                "UPDATE items SET views = views + 1 WHERE id = ?1",
                params![item_id],
            )?;
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    // ==================== Favorite Operations ====================

    /// Returns `true` when the pair was newly inserted
    pub fn add_favorite(&self, user_id: UserId, item_id: ItemId) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        if !exists(&conn, "items", item_id)? {
            return Err(DbError::ItemNotFound(item_id));
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, item_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, item_id, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    pub fn remove_favorite(&self, user_id: UserId, item_id: ItemId) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND item_id = ?2",
            params![user_id, item_id],
        )?;
        Ok(removed > 0)
    }

    pub fn get_favorites(&self, user_id: UserId) -> DbResult<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let columns = ITEM_COLUMNS
            .split(", ")
            .map(|c| format!("i.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM favorites f JOIN items i ON i.id = f.item_id
             WHERE f.user_id = ?1 AND i.status != 'deleted'
             ORDER BY f.created_at DESC, i.id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], parse_item_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Proposal Operations ====================

    /// Insert a pending proposal. `None` means the pair was already proposed.
    pub fn create_proposal(&self, proposal: &NewProposal) -> DbResult<Option<ProposalId>> {
        let conn = self.conn.lock().unwrap();
        for item_id in [proposal.liked_item_id, proposal.proposer_item_id] {
            if !exists(&conn, "items", item_id)? {
                return Err(DbError::ItemNotFound(item_id));
            }
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO proposals
                 (liked_item_id, proposer_item_id, proposer_id, target_id, message, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            params![
                proposal.liked_item_id,
                proposal.proposer_item_id,
                proposal.proposer_id,
                proposal.target_id,
                proposal.message,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok((inserted > 0).then(|| conn.last_insert_rowid()))
    }

    pub fn get_proposal(&self, id: ProposalId) -> DbResult<Option<Proposal>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("{PROPOSAL_SELECT} WHERE p.id = ?1");
        conn.query_row(&sql, params![id], parse_proposal_row)
            .optional()
            .map_err(DbError::from)
    }

    /// Proposals addressed to `user_id`, most recent first
    pub fn get_incoming_proposals(
        &self,
        user_id: UserId,
        status: Option<ProposalStatus>,
    ) -> DbResult<Vec<Proposal>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "{PROPOSAL_SELECT}
             WHERE p.target_id = ?1 AND (?2 IS NULL OR p.status = ?2)
             ORDER BY p.created_at DESC, p.id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, status.map(ProposalStatus::as_str)],
            parse_proposal_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Proposals made by `user_id`, most recent first
    pub fn get_outgoing_proposals(&self, user_id: UserId) -> DbResult<Vec<Proposal>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "{PROPOSAL_SELECT}
             WHERE p.proposer_id = ?1
             ORDER BY p.created_at DESC, p.id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], parse_proposal_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Compare-and-set the proposal status and stamp the response time.
    ///
    /// Returns `false` when the proposal is no longer in `from`. Moving to
    /// `Completed` bumps both participants' swap counters in the same
    /// transaction.
    pub fn update_proposal_status(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> DbResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE proposals SET status = ?3, responded_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id, from.as_str(), to.as_str(), Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        if to == ProposalStatus::Completed {
            tx.execute(
                "UPDATE users SET total_swaps = total_swaps + 1
                 WHERE id IN (SELECT proposer_id FROM proposals WHERE id = ?1
                              UNION SELECT target_id FROM proposals WHERE id = ?1)",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    // ==================== Rating Operations ====================

    /// Insert a rating and recompute the rated user's average.
    ///
    /// `None` means this (rater, rated, proposal) triple was already rated.
    pub fn add_rating(&self, rating: &NewRating) -> DbResult<Option<f64>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if let Some(proposal_id) = rating.proposal_id {
            if !exists(&tx, "proposals", proposal_id)? {
                return Err(DbError::ProposalNotFound(proposal_id));
            }
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO ratings (rater_id, rated_id, proposal_id, score, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rating.rater_id,
                rating.rated_id,
                rating.proposal_id,
                rating.score,
                rating.comment,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        let average: f64 = tx.query_row(
            "SELECT AVG(score) FROM ratings WHERE rated_id = ?1",
            params![rating.rated_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE users SET reputation = ?2 WHERE id = ?1",
            params![rating.rated_id, average],
        )?;
        tx.commit()?;
        Ok(Some(average))
    }
}

/// Install SQL helpers used by candidate queries
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "haversine_km",
        4,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lat1: Option<f64> = ctx.get(0)?;
            let lon1: Option<f64> = ctx.get(1)?;
            let lat2: Option<f64> = ctx.get(2)?;
            let lon2: Option<f64> = ctx.get(3)?;
            Ok(match (lat1, lon1, lat2, lon2) {
                (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) => {
                    Some(haversine_km(lat1, lon1, lat2, lon2))
                }
                _ => None,
            })
        },
    )
}

/// Whether a row with this id exists. `table` is always a literal.
fn exists(conn: &Connection, table: &str, id: i64) -> rusqlite::Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
    conn.query_row(&sql, params![id], |row| row.get(0))
}

fn query_user(conn: &Connection, id: UserId) -> DbResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, params![id], |row| {
        Ok(User {
            id: row.get(0)?,
            display_name: row.get(1)?,
            phone: row.get(2)?,
            location: parse_point(row.get(3)?, row.get(4)?),
            location_label: row.get(5)?,
            reputation: row.get(6)?,
            total_swaps: row.get::<_, i64>(7)? as u64,
            created_at: parse_datetime(row, 8)?,
        })
    })
    .optional()
    .map_err(DbError::from)
}

fn parse_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let category: String = row.get(2)?;
    let category: Category = category
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let status: String = row.get(11)?;
    let status: ItemStatus = status
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, e.into()))?;

    Ok(Item {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category,
        title: row.get(3)?,
        description: row.get(4)?,
        price: row.get::<_, Option<i64>>(5)?.map(|p| p as u64),
        photo: row.get(6)?,
        location: parse_point(row.get(7)?, row.get(8)?),
        location_label: row.get(9)?,
        views: row.get::<_, i64>(10)? as u64,
        status,
        created_at: parse_datetime(row, 12)?,
        updated_at: parse_datetime(row, 13)?,
    })
}

fn parse_proposal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Proposal> {
    let status: String = row.get(8)?;
    let status: ProposalStatus = status
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, e.into()))?;

    Ok(Proposal {
        id: row.get(0)?,
        liked_item_id: row.get(1)?,
        liked_item_title: row.get(2)?,
        proposer_item_id: row.get(3)?,
        proposer_item_title: row.get(4)?,
        proposer_id: row.get(5)?,
        target_id: row.get(6)?,
        message: row.get(7)?,
        status,
        created_at: parse_datetime(row, 9)?,
        responded_at: match row.get_ref(10)? {
            ValueRef::Null => None,
            _ => Some(parse_datetime(row, 10)?),
        },
    })
}

fn parse_point(lat: Option<f64>, lon: Option<f64>) -> Option<GeoPoint> {
    lat.zip(lon).map(|(lat, lon)| GeoPoint { lat, lon })
}

fn parse_datetime(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
