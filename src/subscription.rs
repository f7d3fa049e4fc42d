use crate::messaging::Frame;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked for every inbound frame addressed to a subscribed task id.
pub type TaskCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Handle returned by `TaskChannel::subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub(crate) task_id: String,
    pub(crate) id: Uuid,
}

impl SubscriptionHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

struct RegisteredCallback {
    id: Uuid,
    callback: TaskCallback,
}

/// Outcome of registering a callback.
pub struct SubscribeOutcome {
    pub handle: SubscriptionHandle,
    /// True when this registration created the task id's entry, meaning a
    /// `subscribe` frame must go out.
    pub first_for_task: bool,
    /// True when the same callback was already registered for this id.
    pub deduplicated: bool,
}

/// Outcome of removing a callback.
pub struct UnsubscribeOutcome {
    pub removed: bool,
    /// True when the task id's entry was deleted, meaning an `unsubscribe`
    /// frame must go out.
    pub task_removed: bool,
}

/// Maps task ids to the callbacks interested in them.
///
/// A task id has exactly zero or one entry; registering the same callback
/// handle twice is idempotent (`Arc::ptr_eq`).
#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<String, Vec<RegisteredCallback>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task_id: &str, callback: TaskCallback) -> SubscribeOutcome {
        let entry = self.topics.entry(task_id.to_string()).or_default();
        let first_for_task = entry.is_empty();

        if let Some(existing) = entry
            .iter()
            .find(|rc| Arc::ptr_eq(&rc.callback, &callback))
        {
            return SubscribeOutcome {
                handle: SubscriptionHandle {
                    task_id: task_id.to_string(),
                    id: existing.id,
                },
                first_for_task: false,
                deduplicated: true,
            };
        }

        let id = Uuid::new_v4();
        entry.push(RegisteredCallback { id, callback });

        SubscribeOutcome {
            handle: SubscriptionHandle {
                task_id: task_id.to_string(),
                id,
            },
            first_for_task,
            deduplicated: false,
        }
    }

    pub fn remove(&mut self, task_id: &str, id: Uuid) -> UnsubscribeOutcome {
        let Some(entry) = self.topics.get_mut(task_id) else {
            return UnsubscribeOutcome {
                removed: false,
                task_removed: false,
            };
        };

        let before = entry.len();
        entry.retain(|rc| rc.id != id);
        let removed = entry.len() < before;

        let task_removed = entry.is_empty();
        if task_removed {
            self.topics.remove(task_id);
        }

        UnsubscribeOutcome {
            removed,
            task_removed,
        }
    }

    /// Snapshot of the callbacks registered for a task id, for lock-free dispatch.
    pub fn callbacks_for(&self, task_id: &str) -> Vec<TaskCallback> {
        self.topics
            .get(task_id)
            .map(|entry| entry.iter().map(|rc| Arc::clone(&rc.callback)).collect())
            .unwrap_or_default()
    }

    /// Task ids with at least one live callback, for resubscription after a reconnect.
    pub fn task_ids(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> TaskCallback {
        Arc::new(|_frame: &Frame| {})
    }

    #[test]
    fn test_first_and_subsequent_registration() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.add("T1", noop());
        assert!(first.first_for_task);
        assert!(!first.deduplicated);

        let second = registry.add("T1", noop());
        assert!(!second.first_for_task);
        assert!(!second.deduplicated);
        assert_eq!(registry.callbacks_for("T1").len(), 2);
    }

    #[test]
    fn test_same_callback_twice_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        let cb = noop();
        let first = registry.add("T1", Arc::clone(&cb));
        let second = registry.add("T1", cb);

        assert!(second.deduplicated);
        assert_eq!(first.handle, second.handle);
        assert_eq!(registry.callbacks_for("T1").len(), 1);
    }

    #[test]
    fn test_remove_last_callback_deletes_task_entry() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.add("T2", noop()).handle;
        let b = registry.add("T2", noop()).handle;

        let outcome = registry.remove("T2", a.id);
        assert!(outcome.removed);
        assert!(!outcome.task_removed);
        assert_eq!(registry.callbacks_for("T2").len(), 1);

        let outcome = registry.remove("T2", b.id);
        assert!(outcome.removed);
        assert!(outcome.task_removed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("T1", noop());
        let outcome = registry.remove("nope", Uuid::new_v4());
        assert!(!outcome.removed);
        assert!(!outcome.task_removed);
    }

    #[test]
    fn test_snapshot_is_independent_of_registry() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_cb = Arc::clone(&counter);
        let mut registry = SubscriptionRegistry::new();
        let handle = registry
            .add(
                "T1",
                Arc::new(move |_| {
                    counter_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .handle;

        let snapshot = registry.callbacks_for("T1");
        registry.remove("T1", handle.id);

        for cb in snapshot {
            cb(&Frame::heartbeat_response());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_ids_lists_live_topics() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("T1", noop());
        registry.add("T2", noop());
        let mut ids = registry.task_ids();
        ids.sort();
        assert_eq!(ids, vec!["T1".to_string(), "T2".to_string()]);
    }
}
