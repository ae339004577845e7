//! Activity log operations

use rusqlite::params;
use tracing::warn;

use super::{now_timestamp, parse_datetime, Database};
use crate::error::Result;
use crate::models::{ActivityEntry, ActivityFilter};

/// Longest `details` string kept; longer text is truncated
pub const MAX_DETAILS_LEN: usize = 512;

const DEFAULT_LIST_LIMIT: i64 = 100;

fn truncate_details(details: &str) -> &str {
    if details.len() <= MAX_DETAILS_LEN {
        return details;
    }
    let mut end = MAX_DETAILS_LEN;
    while !details.is_char_boundary(end) {
        end -= 1;
    }
    &details[..end]
}

impl Database {
    /// Append an activity record
    pub fn log_activity(
        &self,
        actor: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO activity_log (timestamp, actor, action, entity_type, entity_id, details)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                now_timestamp(),
                actor,
                action,
                entity_type,
                entity_id,
                details.map(truncate_details),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Record activity without letting a logging failure fail the caller
    pub(crate) fn record_activity(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: i64,
        details: &str,
    ) {
        if let Err(e) = self.log_activity(
            actor,
            action,
            Some(entity_type),
            Some(entity_id),
            Some(details),
        ) {
            warn!(action, entity_id, error = %e, "Failed to write activity log");
        }
    }

    /// List activity, newest first
    pub fn list_activity(&self, filter: &ActivityFilter) -> Result<Vec<ActivityEntry>> {
        let conn = self.conn()?;
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000);

        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, actor, action, entity_type, entity_id, details
            FROM activity_log
            WHERE (?1 IS NULL OR actor = ?1)
              AND (?2 IS NULL OR entity_type = ?2)
            ORDER BY timestamp DESC, id DESC
            LIMIT ?3
            "#,
        )?;

        let entries = stmt
            .query_map(
                params![filter.actor, filter.entity_type, limit],
                |row| {
                    let timestamp: String = row.get(1)?;
                    Ok(ActivityEntry {
                        id: row.get(0)?,
                        timestamp: parse_datetime(&timestamp),
                        actor: row.get(2)?,
                        action: row.get(3)?,
                        entity_type: row.get(4)?,
                        entity_id: row.get(5)?,
                        details: row.get(6)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
