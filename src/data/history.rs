//! Windowed reads of the history log.

use std::sync::Arc;

use tracing::{debug, warn};
use vitalsync_types::HistoryPoint;

use crate::client::VitalsClient;

/// Default number of points in a window.
pub const DEFAULT_LIMIT: usize = 20;

/// Field the history log is ordered by.
const ORDER_BY: &str = "ts";

/// The most recent history points, sorted once by time.
///
/// Charts read it oldest first, tables newest first; both views come from
/// the same fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryWindow {
    points: Vec<HistoryPoint>,
}

impl HistoryWindow {
    /// Build a window from points in any order.
    pub fn new(mut points: Vec<HistoryPoint>) -> Self {
        points.sort_by_key(|p| p.recorded_at);
        Self { points }
    }

    /// Oldest first.
    pub fn ascending(&self) -> &[HistoryPoint] {
        &self.points
    }

    /// Newest first.
    pub fn descending(&self) -> impl Iterator<Item = &HistoryPoint> + '_ {
        self.points.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The most recent point, if any.
    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.last()
    }
}

/// Reads the last N points of the history log.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    client: Arc<VitalsClient>,
    path: String,
}

impl HistoryQuery {
    pub fn new(client: Arc<VitalsClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    /// Fetch the `limit` most recent points.
    ///
    /// Entries without a usable timestamp are skipped. If the store cannot
    /// be reached the window is empty.
    pub async fn recent(&self, limit: usize) -> HistoryWindow {
        if limit == 0 {
            return HistoryWindow::default();
        }

        self.client.ensure_auth().await;
        let entries = match self
            .client
            .store()
            .query_last(&self.path, ORDER_BY, limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, path = %self.path, "History query failed, returning an empty window");
                return HistoryWindow::default();
            }
        };

        let total = entries.len();
        let points: Vec<HistoryPoint> = entries
            .values()
            .filter_map(HistoryPoint::from_remote)
            .collect();
        if points.len() < total {
            debug!(skipped = total - points.len(), "Skipped history entries without a timestamp");
        }

        HistoryWindow::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitalsync_store::{MemoryIdentity, MemoryStore, RemoteStore};

    fn query(store: &MemoryStore) -> HistoryQuery {
        let client = VitalsClient::new(Arc::new(store.clone()), Arc::new(MemoryIdentity::new()));
        HistoryQuery::new(Arc::new(client), "history")
    }

    #[test]
    fn test_window_orders() {
        let window = HistoryWindow::new(vec![
            HistoryPoint::new(3, None, None, None, None),
            HistoryPoint::new(1, None, None, None, None),
            HistoryPoint::new(2, None, None, None, None),
        ]);

        let ascending: Vec<u64> = window.ascending().iter().map(|p| p.recorded_at).collect();
        let descending: Vec<u64> = window.descending().map(|p| p.recorded_at).collect();
        assert_eq!(ascending, vec![1, 2, 3]);
        assert_eq!(descending, vec![3, 2, 1]);
        assert_eq!(window.latest().map(|p| p.recorded_at), Some(3));
    }

    #[tokio::test]
    async fn test_fewer_points_than_limit() {
        let store = MemoryStore::new();
        for ts in [5, 3, 1, 4, 2] {
            store
                .append("history", json!({ "ts": ts, "hr": 70 + ts }))
                .await
                .unwrap();
        }

        let window = query(&store).recent(20).await;
        assert_eq!(window.len(), 5);

        let ascending: Vec<u64> = window.ascending().iter().map(|p| p.recorded_at).collect();
        let descending: Vec<u64> = window.descending().map(|p| p.recorded_at).collect();
        assert_eq!(ascending, vec![1, 2, 3, 4, 5]);
        assert_eq!(descending, vec![5, 4, 3, 2, 1]);
        assert_eq!(window.ascending()[0].heart_rate, Some(71.0));
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let store = MemoryStore::new();
        for ts in 1..=30 {
            store.append("history", json!({ "ts": ts })).await.unwrap();
        }

        let window = query(&store).recent(20).await;
        assert_eq!(window.len(), 20);
        assert_eq!(window.ascending()[0].recorded_at, 11);
        assert_eq!(window.latest().map(|p| p.recorded_at), Some(30));
    }

    #[tokio::test]
    async fn test_entries_without_timestamp_are_skipped() {
        let store = MemoryStore::new();
        store.set("history/a", json!({ "ts": 1, "hr": "72" }));
        store.set("history/b", json!({ "hr": 80 }));
        store.set("history/c", json!("garbage"));

        let window = query(&store).recent(20).await;
        assert_eq!(window.len(), 1);
        assert_eq!(window.ascending()[0].heart_rate, Some(72.0));
    }

    #[tokio::test]
    async fn test_empty_and_unreachable() {
        let store = MemoryStore::new();
        assert!(query(&store).recent(20).await.is_empty());

        store.append("history", json!({ "ts": 1 })).await.unwrap();
        assert!(query(&store).recent(0).await.is_empty());

        store.set_offline(true);
        assert!(query(&store).recent(20).await.is_empty());
    }
}
