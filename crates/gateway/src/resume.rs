//! Resume Policy (C2, §4.2) — decides whether a thread's next message
//! continues a prior external session id or starts a fresh one.

use chrono::{DateTime, Utc};
use sa_domain::config::SessionConfig;
use sa_domain::error::{Error, Result};
use sa_store::Store;

/// `ShouldResume(channel, thread_ts, now) -> (bool, prior_external_session_id)`.
///
/// An active session for the thread is an [`Error::ActiveSessionCollision`],
/// not a `(false, None)` — the caller must fail loudly rather than start a
/// second concurrent session.
pub async fn should_resume(
    store: &Store,
    session_config: &SessionConfig,
    channel: &str,
    thread_ts: &str,
    now: DateTime<Utc>,
) -> Result<(bool, Option<String>)> {
    if store.has_active_session_for_thread(channel, thread_ts).await? {
        return Err(Error::ActiveSessionCollision {
            channel: channel.to_owned(),
            thread_ts: thread_ts.to_owned(),
        });
    }

    if session_config.resume_window_secs == 0 {
        return Ok((false, None));
    }

    let Some(thread) = store.get_thread(channel, thread_ts).await? else {
        return Ok((false, None));
    };

    let Some(prior) = store.get_latest_completed_session_by_thread(thread.id).await? else {
        return Ok((false, None));
    };

    let Some(ended_at) = prior.ended_at else {
        return Ok((false, None));
    };

    if now - ended_at <= session_config.resume_window() {
        Ok((true, Some(prior.external_id)))
    } else {
        Ok((false, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::SessionStatus;

    async fn open_temp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn fresh_thread_never_resumes() {
        let (store, _dir) = open_temp().await;
        let cfg = SessionConfig {
            timeout_secs: 1800,
            cleanup_interval_secs: 300,
            resume_window_secs: 3600,
        };
        let (resumed, prior) = should_resume(&store, &cfg, "C1", "T1", Utc::now()).await.unwrap();
        assert!(!resumed);
        assert!(prior.is_none());
    }

    #[tokio::test]
    async fn active_session_is_a_collision_error() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "T1", "/w").await.unwrap();
        store.create_session(thread.id, "temp_1", "/w", "hi", None).await.unwrap();
        let cfg = SessionConfig { timeout_secs: 1800, cleanup_interval_secs: 300, resume_window_secs: 3600 };
        let err = should_resume(&store, &cfg, "C1", "T1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::ActiveSessionCollision { .. }));
    }

    #[tokio::test]
    async fn resume_window_zero_never_resumes() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "T1", "/w").await.unwrap();
        let session = store.create_session(thread.id, "s1", "/w", "hi", None).await.unwrap();
        store.update_session_end_time(&session.external_id, SessionStatus::Completed).await.unwrap();

        let cfg = SessionConfig { timeout_secs: 1800, cleanup_interval_secs: 300, resume_window_secs: 0 };
        let (resumed, _) = should_resume(&store, &cfg, "C1", "T1", Utc::now()).await.unwrap();
        assert!(!resumed);
    }

    #[tokio::test]
    async fn within_window_resumes_prior_external_id() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "T1", "/w").await.unwrap();
        let session = store.create_session(thread.id, "s1", "/w", "hi", None).await.unwrap();
        store.update_session_end_time(&session.external_id, SessionStatus::Completed).await.unwrap();

        let cfg = SessionConfig { timeout_secs: 1800, cleanup_interval_secs: 300, resume_window_secs: 3600 };
        let (resumed, prior) = should_resume(&store, &cfg, "C1", "T1", Utc::now()).await.unwrap();
        assert!(resumed);
        assert_eq!(prior.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn outside_window_does_not_resume() {
        let (store, _dir) = open_temp().await;
        let thread = store.create_thread("C1", "T1", "/w").await.unwrap();
        let session = store.create_session(thread.id, "s1", "/w", "hi", None).await.unwrap();
        store.update_session_end_time(&session.external_id, SessionStatus::Completed).await.unwrap();

        let cfg = SessionConfig { timeout_secs: 1800, cleanup_interval_secs: 300, resume_window_secs: 60 };
        let later = Utc::now() + chrono::Duration::hours(2);
        let (resumed, _) = should_resume(&store, &cfg, "C1", "T1", later).await.unwrap();
        assert!(!resumed);
    }
}
