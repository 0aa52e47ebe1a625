use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::FallbackConfig;
use crate::core::Notification;

/// In-process, per-owner bounded notification store, used only while the
/// persistent store path is unavailable. Best-effort: misses are empty
/// results, never errors.
#[derive(Clone)]
pub struct FallbackStore {
    lists: Arc<RwLock<HashMap<String, Vec<Notification>>>>,
    config: FallbackConfig,
}

impl FallbackStore {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            lists: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Append a notification for an owner.
    ///
    /// Expired entries are dropped first; if the live list is still at the
    /// owner cap, only the `trim_to` most recently created entries are kept
    /// before the new one is pushed.
    pub fn append(&self, notification: Notification) {
        let mut lists = self.lists.write();
        let list = lists
            .entry(notification.owner_id.clone())
            .or_default();

        list.retain(|n| !n.is_expired());

        if list.len() >= self.config.owner_cap {
            list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let dropped = list.len() - self.config.trim_to;
            list.truncate(self.config.trim_to);
            warn!(
                "Fallback store trimmed {} entries for owner {}",
                dropped, notification.owner_id
            );
        }

        debug!(
            "Fallback store append for owner {} (id={})",
            notification.owner_id, notification.id
        );
        list.push(notification);
    }

    /// Live notifications for an owner, newest first, capped at `limit`
    pub fn list(&self, owner_id: &str, limit: usize, unread_only: bool) -> Vec<Notification> {
        let lists = self.lists.read();
        let Some(list) = lists.get(owner_id) else {
            return Vec::new();
        };

        let mut result: Vec<Notification> = list
            .iter()
            .filter(|n| !n.is_expired())
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        result
    }

    /// Flip `read` in place; `false` when the notification is not held here
    pub fn mark_read(&self, owner_id: &str, notification_id: &str) -> bool {
        let mut lists = self.lists.write();
        let Some(list) = lists.get_mut(owner_id) else {
            return false;
        };

        match list.iter_mut().find(|n| n.id == notification_id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    /// Count of live unread notifications for an owner
    pub fn unread_count(&self, owner_id: &str) -> usize {
        let lists = self.lists.read();
        lists
            .get(owner_id)
            .map(|list| {
                list.iter()
                    .filter(|n| !n.is_expired() && !n.read)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of owners with a fallback list
    pub fn owner_count(&self) -> usize {
        self.lists.read().len()
    }

    pub fn clear(&self) {
        self.lists.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewNotification, NotificationKind, Priority};
    use chrono::{Duration, Utc};

    fn store() -> FallbackStore {
        FallbackStore::new(FallbackConfig {
            owner_cap: 100,
            trim_to: 50,
        })
    }

    fn notification(owner: &str, title: &str) -> Notification {
        Notification::new(NewNotification {
            owner_id: owner.to_string(),
            kind: NotificationKind::ChatMessage,
            title: title.to_string(),
            body: String::new(),
            data: serde_json::Value::Null,
            priority: Priority::Normal,
            channels: vec![],
            expires_at: None,
        })
    }

    #[test]
    fn test_append_and_list_newest_first() {
        let store = store();

        let mut first = notification("u1", "first");
        first.created_at = Utc::now() - Duration::seconds(10);
        store.append(first);
        store.append(notification("u1", "second"));

        let list = store.list("u1", 50, false);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "second");
        assert_eq!(list[1].title, "first");
    }

    #[test]
    fn test_list_unknown_owner_is_empty() {
        assert!(store().list("nobody", 50, false).is_empty());
        assert_eq!(store().unread_count("nobody"), 0);
    }

    #[test]
    fn test_list_respects_limit_and_unread_filter() {
        let store = store();
        for i in 0..5 {
            let mut n = notification("u1", &format!("n{}", i));
            n.created_at = Utc::now() - Duration::seconds(10 - i);
            store.append(n);
        }

        let limited = store.list("u1", 3, false);
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[0].title, "n4");

        let read_id = store.list("u1", 1, false)[0].id.clone();
        assert!(store.mark_read("u1", &read_id));

        let unread = store.list("u1", 50, true);
        assert_eq!(unread.len(), 4);
        assert!(unread.iter().all(|n| n.id != read_id));
    }

    #[test]
    fn test_cap_trims_to_most_recent() {
        let store = store();

        // 100 live entries with strictly increasing created_at
        for i in 0..100 {
            let mut n = notification("u1", &format!("n{}", i));
            n.created_at = Utc::now() - Duration::seconds(200 - i);
            store.append(n);
        }
        assert_eq!(store.list("u1", 200, false).len(), 100);

        // The 101st live append trims to the 50 newest, then pushes
        store.append(notification("u1", "n100"));

        let list = store.list("u1", 200, false);
        assert_eq!(list.len(), 51);
        assert_eq!(list[0].title, "n100");
        // Retained entries are n50..n99, the most recent of the old ones
        assert!(list.iter().any(|n| n.title == "n99"));
        assert!(list.iter().any(|n| n.title == "n50"));
        assert!(list.iter().all(|n| n.title != "n49"));
    }

    #[test]
    fn test_expired_entries_are_filtered() {
        let store = store();

        let mut stale = notification("u1", "stale");
        stale.expires_at = Some(Utc::now() - Duration::seconds(1));
        store.append(stale);
        store.append(notification("u1", "live"));

        let list = store.list("u1", 50, false);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "live");
        assert_eq!(store.unread_count("u1"), 1);
    }

    #[test]
    fn test_mark_read_missing_is_noop() {
        let store = store();
        store.append(notification("u1", "only"));

        assert!(!store.mark_read("u1", "no-such-id"));
        assert!(!store.mark_read("u2", "no-such-id"));
        assert_eq!(store.unread_count("u1"), 1);
    }

    #[test]
    fn test_mark_read_decrements_unread_count() {
        let store = store();
        store.append(notification("u1", "a"));
        store.append(notification("u1", "b"));
        assert_eq!(store.unread_count("u1"), 2);

        let id = store.list("u1", 1, false)[0].id.clone();
        assert!(store.mark_read("u1", &id));
        assert_eq!(store.unread_count("u1"), 1);
    }
}
