//! C1 Store — a single writer task owning the one `rusqlite::Connection`.
//!
//! Every other component talks to it through this `mpsc` request channel and
//! awaits a `oneshot` reply; that indirection is what "single writer" and
//! "short serialization window" (§4.1, §5) mean operationally.

use std::path::Path;

use sa_domain::error::{Error, Result};
use sa_domain::model::{Session, SessionMetrics, SessionStatus, Thread};
use tokio::sync::{mpsc, oneshot};

use crate::migrations;

const REQUEST_CHANNEL_CAPACITY: usize = 256;

enum Request {
    CreateThread {
        channel_id: String,
        thread_ts: String,
        work_dir: String,
        reply: oneshot::Sender<Result<Thread>>,
    },
    GetThread {
        channel_id: String,
        thread_ts: String,
        reply: oneshot::Sender<Result<Option<Thread>>>,
    },
    UpdateThreadTimestamp {
        thread_id: i64,
        thread_ts: String,
        reply: oneshot::Sender<Result<()>>,
    },
    CreateSession {
        thread_id: i64,
        external_id: String,
        work_dir: String,
        initial_prompt: String,
        model: Option<String>,
        reply: oneshot::Sender<Result<Session>>,
    },
    UpdateSessionExternalId {
        old: String,
        new: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateSessionModel {
        external_id: String,
        model: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateSessionStatus {
        external_id: String,
        status: SessionStatus,
        metrics: SessionMetrics,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateSessionEndTime {
        external_id: String,
        status: SessionStatus,
        reply: oneshot::Sender<Result<()>>,
    },
    GetLatestCompletedSessionByThread {
        thread_id: i64,
        reply: oneshot::Sender<Result<Option<Session>>>,
    },
    HasActiveSessionForThread {
        channel_id: String,
        thread_ts: String,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// A cheap, cloneable handle to the store's writer task.
#[derive(Clone)]
pub struct Store {
    tx: mpsc::Sender<Request>,
}

impl Store {
    /// Open the database at `path` (creating it and its parent directory if
    /// needed), apply pending migrations, and start the writer task.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::apply_all(&conn)?;

        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        std::thread::Builder::new()
            .name("sa-store-writer".into())
            .spawn(move || writer_loop(conn, rx))
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        Ok(Self { tx })
    }

    pub async fn create_thread(&self, channel_id: &str, thread_ts: &str, work_dir: &str) -> Result<Thread> {
        self.call(|reply| Request::CreateThread {
            channel_id: channel_id.to_owned(),
            thread_ts: thread_ts.to_owned(),
            work_dir: work_dir.to_owned(),
            reply,
        })
        .await
    }

    pub async fn get_thread(&self, channel_id: &str, thread_ts: &str) -> Result<Option<Thread>> {
        self.call(|reply| Request::GetThread {
            channel_id: channel_id.to_owned(),
            thread_ts: thread_ts.to_owned(),
            reply,
        })
        .await
    }

    pub async fn update_thread_timestamp(&self, thread_id: i64, thread_ts: &str) -> Result<()> {
        self.call(|reply| Request::UpdateThreadTimestamp {
            thread_id,
            thread_ts: thread_ts.to_owned(),
            reply,
        })
        .await
    }

    pub async fn create_session(
        &self,
        thread_id: i64,
        external_id: &str,
        work_dir: &str,
        initial_prompt: &str,
        model: Option<String>,
    ) -> Result<Session> {
        self.call(|reply| Request::CreateSession {
            thread_id,
            external_id: external_id.to_owned(),
            work_dir: work_dir.to_owned(),
            initial_prompt: initial_prompt.to_owned(),
            model,
            reply,
        })
        .await
    }

    pub async fn update_session_external_id(&self, old: &str, new: &str) -> Result<()> {
        self.call(|reply| Request::UpdateSessionExternalId {
            old: old.to_owned(),
            new: new.to_owned(),
            reply,
        })
        .await
    }

    pub async fn update_session_model(&self, external_id: &str, model: &str) -> Result<()> {
        self.call(|reply| Request::UpdateSessionModel {
            external_id: external_id.to_owned(),
            model: model.to_owned(),
            reply,
        })
        .await
    }

    pub async fn update_session_status(
        &self,
        external_id: &str,
        status: SessionStatus,
        metrics: SessionMetrics,
    ) -> Result<()> {
        self.call(|reply| Request::UpdateSessionStatus {
            external_id: external_id.to_owned(),
            status,
            metrics,
            reply,
        })
        .await
    }

    pub async fn update_session_end_time(&self, external_id: &str, status: SessionStatus) -> Result<()> {
        self.call(|reply| Request::UpdateSessionEndTime {
            external_id: external_id.to_owned(),
            status,
            reply,
        })
        .await
    }

    pub async fn get_latest_completed_session_by_thread(&self, thread_id: i64) -> Result<Option<Session>> {
        self.call(|reply| Request::GetLatestCompletedSessionByThread { thread_id, reply })
            .await
    }

    pub async fn has_active_session_for_thread(&self, channel_id: &str, thread_ts: &str) -> Result<bool> {
        self.call(|reply| Request::HasActiveSessionForThread {
            channel_id: channel_id.to_owned(),
            thread_ts: thread_ts.to_owned(),
            reply,
        })
        .await
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::StoreUnavailable("writer task gone".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::StoreUnavailable("writer task dropped reply".into()))?
    }
}

fn writer_loop(conn: rusqlite::Connection, mut rx: mpsc::Receiver<Request>) {
    while let Some(req) = rx.blocking_recv() {
        match req {
            Request::CreateThread { channel_id, thread_ts, work_dir, reply } => {
                let _ = reply.send(create_thread(&conn, &channel_id, &thread_ts, &work_dir));
            }
            Request::GetThread { channel_id, thread_ts, reply } => {
                let _ = reply.send(get_thread(&conn, &channel_id, &thread_ts));
            }
            Request::UpdateThreadTimestamp { thread_id, thread_ts, reply } => {
                let _ = reply.send(update_thread_timestamp(&conn, thread_id, &thread_ts));
            }
            Request::CreateSession { thread_id, external_id, work_dir, initial_prompt, model, reply } => {
                let _ = reply.send(create_session(&conn, thread_id, &external_id, &work_dir, &initial_prompt, model));
            }
            Request::UpdateSessionExternalId { old, new, reply } => {
                let _ = reply.send(update_session_external_id(&conn, &old, &new));
            }
            Request::UpdateSessionModel { external_id, model, reply } => {
                let _ = reply.send(update_session_model(&conn, &external_id, &model));
            }
            Request::UpdateSessionStatus { external_id, status, metrics, reply } => {
                let _ = reply.send(update_session_status(&conn, &external_id, status, &metrics));
            }
            Request::UpdateSessionEndTime { external_id, status, reply } => {
                let _ = reply.send(update_session_end_time(&conn, &external_id, status));
            }
            Request::GetLatestCompletedSessionByThread { thread_id, reply } => {
                let _ = reply.send(get_latest_completed_session_by_thread(&conn, thread_id));
            }
            Request::HasActiveSessionForThread { channel_id, thread_ts, reply } => {
                let _ = reply.send(has_active_session_for_thread(&conn, &channel_id, &thread_ts));
            }
        }
    }
    tracing::info!("store writer task exiting (all handles dropped)");
}

// ── SQL bodies ───────────────────────────────────────────────────────

fn row_to_thread(row: &rusqlite::Row) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get("id")?,
        channel_id: row.get("channel_id")?,
        thread_ts: row.get("thread_ts")?,
        work_dir: row.get("work_dir")?,
    })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let status_str: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    Ok(Session {
        id: row.get("id")?,
        thread_id: row.get("thread_id")?,
        external_id: row.get("external_id")?,
        work_dir: row.get("work_dir")?,
        model: row.get("model")?,
        initial_prompt: row.get("initial_prompt")?,
        status: SessionStatus::parse(&status_str).unwrap_or(SessionStatus::Failed),
        started_at: started_at.parse().unwrap_or_else(|_| chrono::Utc::now()),
        ended_at: ended_at.and_then(|s| s.parse().ok()),
        metrics: SessionMetrics {
            total_cost_usd: row.get("total_cost_usd")?,
            input_tokens: row.get("input_tokens")?,
            output_tokens: row.get("output_tokens")?,
            duration_ms: row.get("duration_ms")?,
            num_turns: row.get("num_turns")?,
        },
    })
}

fn get_thread(conn: &rusqlite::Connection, channel_id: &str, thread_ts: &str) -> Result<Option<Thread>> {
    conn.query_row(
        "SELECT * FROM threads WHERE channel_id = ?1 AND thread_ts = ?2",
        rusqlite::params![channel_id, thread_ts],
        row_to_thread,
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e.into()) })
}

/// Get-or-create: matches C6's "`Store.CreateThread` if missing".
fn create_thread(conn: &rusqlite::Connection, channel_id: &str, thread_ts: &str, work_dir: &str) -> Result<Thread> {
    if let Some(existing) = get_thread(conn, channel_id, thread_ts)? {
        return Ok(existing);
    }
    conn.execute(
        "INSERT INTO threads (channel_id, thread_ts, work_dir) VALUES (?1, ?2, ?3)",
        rusqlite::params![channel_id, thread_ts, work_dir],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Thread {
        id,
        channel_id: channel_id.to_owned(),
        thread_ts: thread_ts.to_owned(),
        work_dir: work_dir.to_owned(),
    })
}

fn update_thread_timestamp(conn: &rusqlite::Connection, thread_id: i64, thread_ts: &str) -> Result<()> {
    conn.execute(
        "UPDATE threads SET thread_ts = ?1 WHERE id = ?2",
        rusqlite::params![thread_ts, thread_id],
    )?;
    Ok(())
}

fn create_session(
    conn: &rusqlite::Connection,
    thread_id: i64,
    external_id: &str,
    work_dir: &str,
    initial_prompt: &str,
    model: Option<String>,
) -> Result<Session> {
    let started_at = chrono::Utc::now();
    conn.execute(
        "INSERT INTO sessions (thread_id, external_id, work_dir, model, initial_prompt, status, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            thread_id,
            external_id,
            work_dir,
            model,
            initial_prompt,
            SessionStatus::Active.as_str(),
            started_at.to_rfc3339(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Session {
        id,
        thread_id,
        external_id: external_id.to_owned(),
        work_dir: work_dir.to_owned(),
        model,
        initial_prompt: initial_prompt.to_owned(),
        status: SessionStatus::Active,
        started_at,
        ended_at: None,
        metrics: SessionMetrics::default(),
    })
}

fn update_session_external_id(conn: &rusqlite::Connection, old: &str, new: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE sessions SET external_id = ?1 WHERE external_id = ?2",
        rusqlite::params![new, old],
    )?;
    if updated == 0 {
        return Err(Error::SessionNotFound(old.to_owned()));
    }
    Ok(())
}

fn update_session_model(conn: &rusqlite::Connection, external_id: &str, model: &str) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET model = ?1 WHERE external_id = ?2",
        rusqlite::params![model, external_id],
    )?;
    Ok(())
}

fn update_session_status(
    conn: &rusqlite::Connection,
    external_id: &str,
    status: SessionStatus,
    metrics: &SessionMetrics,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET status = ?1, total_cost_usd = ?2, input_tokens = ?3,
             output_tokens = ?4, duration_ms = ?5, num_turns = ?6
         WHERE external_id = ?7",
        rusqlite::params![
            status.as_str(),
            metrics.total_cost_usd,
            metrics.input_tokens,
            metrics.output_tokens,
            metrics.duration_ms,
            metrics.num_turns,
            external_id,
        ],
    )?;
    Ok(())
}

fn update_session_end_time(conn: &rusqlite::Connection, external_id: &str, status: SessionStatus) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE external_id = ?3",
        rusqlite::params![status.as_str(), chrono::Utc::now().to_rfc3339(), external_id],
    )?;
    Ok(())
}

fn get_latest_completed_session_by_thread(conn: &rusqlite::Connection, thread_id: i64) -> Result<Option<Session>> {
    conn.query_row(
        "SELECT * FROM sessions
         WHERE thread_id = ?1 AND status IN ('completed', 'failed', 'timeout')
         ORDER BY ended_at DESC LIMIT 1",
        rusqlite::params![thread_id],
        row_to_session,
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e.into()) })
}

fn has_active_session_for_thread(conn: &rusqlite::Connection, channel_id: &str, thread_ts: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM sessions s
             JOIN threads t ON t.id = s.thread_id
             WHERE t.channel_id = ?1 AND t.thread_ts = ?2 AND s.status = 'active'
         )",
        rusqlite::params![channel_id, thread_ts],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn create_thread_is_idempotent_on_unique_key() {
        let (store, _dir) = open_temp().await;
        let a = store.create_thread("C1", "100.1", "/tmp/a").await.unwrap();
        let b = store.create_thread("C1", "100.1", "/tmp/b").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.work_dir, "/tmp/a");
    }

    #[tokio::test]
    async fn get_thread_returns_none_when_absent() {
        let (store, _dir) = open_temp().await;
        assert!(store.get_thread("C1", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn has_active_session_reflects_status() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "100.1", "/tmp/a").await.unwrap();
        assert!(!store.has_active_session_for_thread("C1", "100.1").await.unwrap());

        let session = store
            .create_session(thread.id, "temp_1", "/tmp/a", "hello", None)
            .await
            .unwrap();
        assert!(store.has_active_session_for_thread("C1", "100.1").await.unwrap());

        store
            .update_session_end_time(&session.external_id, SessionStatus::Completed)
            .await
            .unwrap();
        assert!(!store.has_active_session_for_thread("C1", "100.1").await.unwrap());
    }

    #[tokio::test]
    async fn rekeying_external_id_preserves_row() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "100.1", "/tmp/a").await.unwrap();
        store.create_session(thread.id, "temp_1", "/tmp/a", "hi", None).await.unwrap();
        store.update_session_external_id("temp_1", "real-abc").await.unwrap();
        let err = store.update_session_model("temp_1", "m").await;
        // Old id no longer matches any row, but the call itself doesn't fail —
        // an UPDATE matching zero rows is not an error for update_session_model.
        assert!(err.is_ok());
        store.update_session_model("real-abc", "claude-sonnet").await.unwrap();
    }

    #[tokio::test]
    async fn rekeying_unknown_external_id_is_an_error() {
        let (store, _dir) = open_temp().await;
        let result = store.update_session_external_id("temp_missing", "real-1").await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn latest_completed_session_picks_most_recently_ended() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "100.1", "/tmp/a").await.unwrap();

        let first = store.create_session(thread.id, "s1", "/tmp/a", "p1", None).await.unwrap();
        store.update_session_end_time(&first.external_id, SessionStatus::Completed).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let second = store.create_session(thread.id, "s2", "/tmp/a", "p2", None).await.unwrap();
        store.update_session_end_time(&second.external_id, SessionStatus::Completed).await.unwrap();

        let latest = store
            .get_latest_completed_session_by_thread(thread.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.external_id, "s2");
    }
}
