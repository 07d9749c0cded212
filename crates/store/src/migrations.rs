//! Numbered, apply-only migrations embedded in the binary (§4.1).
//!
//! Each entry runs at most once, tracked in `schema_migrations`; re-running
//! against an already-migrated database is a no-op.

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("migrations/001_init.sql"))];

pub fn apply_all(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )?;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            [version],
            |row| row.get(0),
        )?;
        if already_applied {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )?;
        tracing::info!(version, "applied migration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_twice_is_a_no_op() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_all(&conn).unwrap();
        apply_all(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn creates_threads_and_sessions_tables() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_all(&conn).unwrap();
        conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get::<_, i64>(0))
            .unwrap();
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))
            .unwrap();
    }
}
