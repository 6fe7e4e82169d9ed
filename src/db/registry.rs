//! Named session registry.
//!
//! Maps a data-source name to one shared [`ConnectionHandle`], opening the
//! pool on first access and reusing it afterwards.
//!
//! # Concurrency
//!
//! - **`OnceCell` per name**: creation is single-flight. Concurrent `get` calls
//!   for the same new name open one pool and all receive the same `Arc`.
//! - **`RwLock` around the map**: cached lookups take a read lock only. The
//!   write lock is held just long enough to insert or drain cells; no lock is
//!   held while a pool is opened or closed.
//! - **Teardown races**: a pool that finishes opening after its cell was
//!   drained by [`close`](SessionRegistry::close) or
//!   [`close_all`](SessionRegistry::close_all) is closed again and the caller
//!   gets a connection error, so no handle outlives its entry.
//!
//! A failed open leaves an empty cell behind. Empty cells are invisible to
//! [`names`](SessionRegistry::names) and friends, and the next `get` for that
//! name retries the open through the same cell.

use crate::config::{ConfigTree, DEFAULT_CLOSE_TIMEOUT_SECS};
use crate::db::handle::ConnectionHandle;
use crate::db::pool::{Connector, SqlxConnector};
use crate::error::{DbError, DbResult};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

type SessionCell = Arc<OnceCell<Arc<ConnectionHandle>>>;

/// Outcome of [`SessionRegistry::close_all`].
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Data sources whose pools closed within the deadline.
    pub closed: Vec<String>,
    /// Data sources whose pools did not close cleanly.
    pub failed: Vec<(String, DbError)>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Process-wide mapping from data-source name to a live connection handle.
#[derive(Debug)]
pub struct SessionRegistry<C: Connector = SqlxConnector> {
    config: Arc<ConfigTree>,
    connector: C,
    close_timeout: Duration,
    sessions: RwLock<HashMap<String, SessionCell>>,
}

impl SessionRegistry<SqlxConnector> {
    /// Registry opening real sqlx pools.
    pub fn new(config: Arc<ConfigTree>) -> Self {
        Self::with_connector(config, SqlxConnector)
    }
}

impl<C: Connector> SessionRegistry<C> {
    pub fn with_connector(config: Arc<ConfigTree>, connector: C) -> Self {
        Self {
            config,
            connector,
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Deadline applied to each pool during [`close`](Self::close) and
    /// [`close_all`](Self::close_all).
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn config(&self) -> &Arc<ConfigTree> {
        &self.config
    }

    /// Return the handle for `name`, opening its pool on first use.
    ///
    /// An unknown name or an unusable DSN fails with a configuration error
    /// before anything is opened or recorded.
    pub async fn get(&self, name: &str) -> DbResult<Arc<ConnectionHandle>> {
        if let Some(handle) = self.cached(name).await {
            debug!(data_source = name, "Reusing cached session");
            return Ok(handle);
        }

        let source = self.config.data_source(name)?;

        let cell = {
            let mut sessions = self.sessions.write().await;
            // Double-check after acquiring write lock
            Arc::clone(sessions.entry(name.to_string()).or_default())
        };

        let handle = cell
            .get_or_try_init(|| async {
                debug!(data_source = name, "Creating new session");
                let pool = self.connector.connect(&source).await?;
                let handle = ConnectionHandle::new(name, pool)
                    .with_query_timeout(source.pool_options.query_timeout());
                info!(
                    data_source = name,
                    db_type = %handle.db_type(),
                    id = %handle.id(),
                    "Session opened"
                );
                Ok::<_, DbError>(Arc::new(handle))
            })
            .await?;

        if !self.is_current(name, &cell).await {
            warn!(data_source = name, "Session was torn down while opening; closing it");
            handle.close().await;
            return Err(DbError::connection(
                format!("Data source '{name}' was closed while its connection was being opened"),
                "Request the session again",
            ));
        }

        Ok(Arc::clone(handle))
    }

    /// Close and forget the session for `name`. Returns `true` if one existed.
    pub async fn close(&self, name: &str) -> bool {
        let cell = self.sessions.write().await.remove(name);
        let Some(handle) = cell.as_ref().and_then(|cell| cell.get()) else {
            return false;
        };
        if let Err(err) = self.close_handle(name, handle).await {
            warn!(data_source = name, error = %err, "Failed to close session");
        }
        true
    }

    /// Close every session. The registry is empty afterwards and later `get`
    /// calls open fresh pools.
    pub async fn close_all(&self) -> CloseReport {
        // Drain under lock, close outside lock
        let drained: Vec<(String, SessionCell)> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().collect()
        };

        let open: Vec<(String, Arc<ConnectionHandle>)> = drained
            .into_iter()
            .filter_map(|(name, cell)| cell.get().map(|handle| (name, Arc::clone(handle))))
            .collect();

        let outcomes = join_all(open.iter().map(|(name, handle)| async move {
            (name.clone(), self.close_handle(name, handle).await)
        }))
        .await;

        let mut report = CloseReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => report.closed.push(name),
                Err(err) => {
                    warn!(data_source = %name, error = %err, "Failed to close session");
                    report.failed.push((name, err));
                }
            }
        }
        report.closed.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            closed = report.closed.len(),
            failed = report.failed.len(),
            "Closed all sessions"
        );
        report
    }

    /// Whether `name` currently has an open session.
    pub async fn contains(&self, name: &str) -> bool {
        self.cached(name).await.is_some()
    }

    /// Names with an open session, sorted.
    pub async fn names(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut names: Vec<String> = sessions
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn cached(&self, name: &str) -> Option<Arc<ConnectionHandle>> {
        let sessions = self.sessions.read().await;
        sessions.get(name).and_then(|cell| cell.get()).cloned()
    }

    async fn is_current(&self, name: &str, cell: &SessionCell) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
    }

    async fn close_handle(&self, name: &str, handle: &ConnectionHandle) -> DbResult<()> {
        info!(data_source = name, id = %handle.id(), "Closing session");
        tokio::time::timeout(self.close_timeout, handle.close())
            .await
            .map_err(|_| DbError::timeout(format!("closing '{name}'"), self.close_timeout))
    }
}
