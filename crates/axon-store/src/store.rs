//! Reactive property store with per-key ordered subscriber lists.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};

/// Subscriber attached to a property.
///
/// Runs every time the property is written via [`Store::set`],
/// [`Store::set_many`] or [`Store::alt`], even when the written value equals
/// the previous one. Receives `(current, previous)`; the return value is
/// discarded. Identity is the `Arc` allocation: the same subscriber may watch
/// any number of distinct properties, but at most once per property.
///
/// Subscribers are not middleware: writing to a property from inside one of
/// its own subscribers recurses into notification without bound and exhausts
/// the stack.
pub type PropertyHandler<V> = Arc<dyn Fn(&V, &V) + Send + Sync>;

// Subscribers never run while a lock is held, so a poisoned guard still
// guards consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One registered property: its current value and its subscribers.
struct Slot<V: 'static> {
    value: RwLock<Arc<V>>,
    subscribers: RwLock<Vec<PropertyHandler<V>>>,
}

impl<V: 'static> Slot<V> {
    fn new(value: V) -> Self {
        Self {
            value: RwLock::new(Arc::new(value)),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Swap in `current` and return what it replaced.
    fn assign(&self, current: &Arc<V>) -> Arc<V> {
        let mut guard = write(&self.value);
        std::mem::replace(&mut *guard, Arc::clone(current))
    }

    /// Run every subscriber with `(current, previous)`.
    ///
    /// Iterates a snapshot taken up front, so a subscriber that mutates this
    /// slot's subscriber list changes only the next notification.
    fn notify(&self, key: &str, current: &V, previous: &V) {
        let snapshot: Vec<PropertyHandler<V>> = read(&self.subscribers).clone();
        trace!(key, subscribers = snapshot.len(), "notifying property write");
        for subscriber in snapshot {
            subscriber(current, previous);
        }
    }
}

/// Reactive property store over a fixed set of named properties.
///
/// The map given to [`Store::new`] sets the store's structure permanently:
/// values can be written, but keys can never be added or removed. Values are
/// stored behind [`Arc`] and handed out as `Arc` clones — the store never
/// deep-copies, freezes, or diffs them, and changes made to a value's
/// interior (should `V` offer any) are invisible to it: only
/// [`set`](Self::set), [`set_many`](Self::set_many) and [`alt`](Self::alt)
/// notify subscribers.
///
/// The store does not manage subscriber lifetime: detach subscribers
/// belonging to a consumer before discarding the consumer, or they keep
/// firing.
pub struct Store<V: 'static> {
    slots: HashMap<String, Slot<V>>,
}

impl<V: 'static> Store<V> {
    /// Create a store holding exactly the given key→value entries.
    ///
    /// Each key starts with its initial value and an empty subscriber list.
    /// When a key appears more than once in the input, the last value wins.
    #[must_use]
    pub fn new<I, K>(initial: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let slots: HashMap<_, _> = initial
            .into_iter()
            .map(|(key, value)| (key.into(), Slot::new(value)))
            .collect();
        debug!(properties = slots.len(), "property store created");
        Self { slots }
    }

    /// Current value of `key`, shared by reference.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] if `key` is not registered.
    pub fn get(&self, key: &str) -> StoreResult<Arc<V>> {
        let slot = self.slot(key)?;
        Ok(Arc::clone(&read(&slot.value)))
    }

    /// Snapshot of several properties as a key→value map.
    ///
    /// An empty `keys` request returns every registered property.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] naming every requested key that is not
    /// registered; nothing is returned partially.
    pub fn get_many<'k, I>(&self, keys: I) -> StoreResult<HashMap<String, Arc<V>>>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let requested: Vec<&str> = keys.into_iter().collect();
        if requested.is_empty() {
            return Ok(self
                .slots
                .iter()
                .map(|(key, slot)| (key.clone(), Arc::clone(&read(&slot.value))))
                .collect());
        }
        self.ensure_known(requested.iter().copied())?;
        requested
            .into_iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }

    /// Write `value` to `key`, then run the key's subscribers.
    ///
    /// Subscribers run in attachment order with `(current, previous)`, on the
    /// caller's stack, before `set` returns — unconditionally, even when
    /// `value` equals the previous value.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] if `key` is not registered; the store
    /// is left untouched.
    pub fn set(&self, key: &str, value: V) -> StoreResult<()> {
        let slot = self.slot(key)?;
        let current = Arc::new(value);
        let previous = slot.assign(&current);
        slot.notify(key, &current, &previous);
        Ok(())
    }

    /// Write several properties as one batch, then run their subscribers.
    ///
    /// All keys are validated before any mutation. Every assignment in the
    /// batch is applied before the first subscriber runs, so a subscriber
    /// reading a sibling batched key through [`get`](Self::get) observes the
    /// post-batch value. Notification then walks the batch in input order,
    /// each key's subscribers in attachment order with `(current, previous)`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] naming every unregistered key in the
    /// batch; no value is written in that case.
    pub fn set_many<I, K>(&self, entries: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let entries: Vec<(String, V)> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        self.ensure_known(entries.iter().map(|(key, _)| key.as_str()))?;
        trace!(properties = entries.len(), "applying batched write");

        let mut applied = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let slot = self.slot(&key)?;
            let current = Arc::new(value);
            let previous = slot.assign(&current);
            applied.push((key, current, previous));
        }

        // Subscribers only start once the whole batch is written.
        for (key, current, previous) in &applied {
            self.slot(key)?.notify(key, current, previous);
        }
        Ok(())
    }

    /// Write `key` to the value `f` computes from the current one, then run
    /// the key's subscribers as [`set`](Self::set) does.
    ///
    /// `f` must be a pure function of the current value; it must not write
    /// back into the store.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] if `key` is not registered; `f` is not
    /// called in that case.
    pub fn alt<F>(&self, key: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&V) -> V,
    {
        let slot = self.slot(key)?;
        let basis = Arc::clone(&read(&slot.value));
        let current = Arc::new(f(&basis));
        let previous = slot.assign(&current);
        slot.notify(key, &current, &previous);
        Ok(())
    }

    /// Subscribe `handler` to `key`, after all current subscribers.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] if `key` is not registered, or
    /// [`StoreError::DuplicateHandler`] if this `Arc` is already subscribed
    /// to `key`. A failed subscribe leaves the subscriber list untouched.
    pub fn sub(&self, key: &str, handler: PropertyHandler<V>) -> StoreResult<()> {
        let mut subscribers = write(&self.slot(key)?.subscribers);
        if subscribers
            .iter()
            .any(|attached| Arc::ptr_eq(attached, &handler))
        {
            return Err(StoreError::DuplicateHandler(key.to_string()));
        }
        subscribers.push(handler);
        debug!(key, subscribers = subscribers.len(), "subscriber attached");
        Ok(())
    }

    /// Unsubscribe `handler` from `key`.
    ///
    /// Matching is by `Arc` identity. If a notification for `key` is in
    /// flight, the handler still runs in that notification's snapshot.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] if `key` is not registered, or
    /// [`StoreError::HandlerNotAttached`] if `handler` is not currently
    /// subscribed to it.
    pub fn unsub(&self, key: &str, handler: &PropertyHandler<V>) -> StoreResult<()> {
        let mut subscribers = write(&self.slot(key)?.subscribers);
        let position = subscribers
            .iter()
            .position(|attached| Arc::ptr_eq(attached, handler))
            .ok_or_else(|| StoreError::HandlerNotAttached(key.to_string()))?;
        subscribers.remove(position);
        debug!(key, subscribers = subscribers.len(), "subscriber detached");
        Ok(())
    }

    /// The registered property keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Whether `key` is part of the registry.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of subscribers currently attached to `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownProperty`] if `key` is not registered.
    pub fn subscriber_count(&self, key: &str) -> StoreResult<usize> {
        Ok(read(&self.slot(key)?.subscribers).len())
    }

    fn slot(&self, key: &str) -> StoreResult<&Slot<V>> {
        self.slots.get(key).ok_or_else(|| StoreError::unknown(key))
    }

    fn ensure_known<'k, I>(&self, keys: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let unknown: Vec<String> = keys
            .into_iter()
            .filter(|key| !self.slots.contains_key(*key))
            .map(str::to_string)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(StoreError::UnknownProperty { keys: unknown })
        }
    }
}

impl<V: 'static> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, slot) in &self.slots {
            map.entry(key, &read(&slot.subscribers).len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::*;

    /// Subscriber recording every `(current, previous)` pair it sees.
    fn recording_handler(log: &Arc<Mutex<Vec<(i64, i64)>>>) -> PropertyHandler<i64> {
        let log = Arc::clone(log);
        Arc::new(move |current, previous| {
            log.lock().unwrap().push((*current, *previous));
        })
    }

    fn counting_handler(counter: &Arc<AtomicUsize>) -> PropertyHandler<i64> {
        let counter = Arc::clone(counter);
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn get_returns_initial_values() {
        let store = Store::new([("a", 1_i64), ("b", 2_i64)]);

        assert_eq!(*store.get("a").unwrap(), 1);
        assert_eq!(*store.get("b").unwrap(), 2);
        assert!(matches!(
            store.get("c").unwrap_err(),
            StoreError::UnknownProperty { keys } if keys == ["c"]
        ));
    }

    #[test]
    fn get_many_snapshots_all_or_requested_keys() {
        let store = Store::new([("a", 1_i64), ("b", 2_i64)]);

        let all = store.get_many([]).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(*all["a"], 1);
        assert_eq!(*all["b"], 2);

        let some = store.get_many(["b"]).unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(*some["b"], 2);
    }

    #[test]
    fn get_many_aggregates_every_unknown_key() {
        let store = Store::new([("a", 1_i64)]);

        let err = store.get_many(["a", "nope", "missing"]).unwrap_err();

        assert!(matches!(
            err,
            StoreError::UnknownProperty { keys } if keys == ["nope", "missing"]
        ));
    }

    #[test]
    fn set_updates_value_and_notifies_with_both_values() {
        let store = Store::new([("a", 1_i64)]);
        let log = Arc::new(Mutex::new(Vec::new()));
        store.sub("a", recording_handler(&log)).unwrap();

        store.set("a", 5).unwrap();

        assert_eq!(*store.get("a").unwrap(), 5);
        assert_eq!(*log.lock().unwrap(), vec![(5, 1)]);
    }

    #[test]
    fn set_without_subscribers_still_writes() {
        let store = Store::new([("a", 1_i64)]);
        store.set("a", 5).unwrap();
        assert_eq!(*store.get("a").unwrap(), 5);
    }

    #[test]
    fn repeated_identical_set_notifies_every_time() {
        let store = Store::new([("a", 1_i64)]);
        let log = Arc::new(Mutex::new(Vec::new()));
        store.sub("a", recording_handler(&log)).unwrap();

        store.set("a", 5).unwrap();
        store.set("a", 5).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![(5, 1), (5, 5)]);
    }

    #[test]
    fn set_unknown_key_fails_without_mutation() {
        let store = Store::new([("a", 1_i64)]);

        assert!(matches!(
            store.set("b", 5).unwrap_err(),
            StoreError::UnknownProperty { keys } if keys == ["b"]
        ));
        assert_eq!(*store.get("a").unwrap(), 1);
    }

    #[test]
    fn subscribers_run_in_subscription_order() {
        let store = Store::new([("a", 0_i64)]);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            store
                .sub("a", Arc::new(move |_, _| order.lock().unwrap().push(tag)))
                .unwrap();
        }

        store.set("a", 1).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn set_many_presents_post_batch_state_to_subscribers() {
        let store = Arc::new(Store::new([("x", 1_i64), ("y", 1_i64)]));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observer: PropertyHandler<i64> = {
            let store = Arc::clone(&store);
            let seen = Arc::clone(&seen);
            Arc::new(move |_, _| {
                seen.lock().unwrap().push(*store.get("y").unwrap());
            })
        };
        store.sub("x", observer).unwrap();

        store.set_many([("x", 2), ("y", 2)]).unwrap();

        // The x subscriber already observes y's batched value.
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn set_many_notifies_each_key_with_its_previous_value() {
        let store = Store::new([("x", 1_i64), ("y", 10_i64)]);
        let x_log = Arc::new(Mutex::new(Vec::new()));
        let y_log = Arc::new(Mutex::new(Vec::new()));
        store.sub("x", recording_handler(&x_log)).unwrap();
        store.sub("y", recording_handler(&y_log)).unwrap();

        store.set_many([("x", 2), ("y", 20)]).unwrap();

        assert_eq!(*x_log.lock().unwrap(), vec![(2, 1)]);
        assert_eq!(*y_log.lock().unwrap(), vec![(20, 10)]);
    }

    #[test]
    fn set_many_validates_before_any_mutation() {
        let store = Store::new([("a", 1_i64)]);
        let calls = Arc::new(AtomicUsize::new(0));
        store.sub("a", counting_handler(&calls)).unwrap();

        let err = store.set_many([("a", 9), ("nope", 1)]).unwrap_err();

        assert!(matches!(
            err,
            StoreError::UnknownProperty { keys } if keys == ["nope"]
        ));
        assert_eq!(*store.get("a").unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn alt_applies_update_function_and_notifies() {
        let store = Store::new([("a", 5_i64)]);
        let log = Arc::new(Mutex::new(Vec::new()));
        store.sub("a", recording_handler(&log)).unwrap();

        store.alt("a", |n| n.saturating_add(1)).unwrap();

        assert_eq!(*store.get("a").unwrap(), 6);
        assert_eq!(*log.lock().unwrap(), vec![(6, 5)]);
    }

    #[test]
    fn alt_unknown_key_never_calls_the_function() {
        let store = Store::<i64>::new([("a", 5_i64)]);

        let err = store
            .alt("b", |_| panic!("update function must not run"))
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownProperty { .. }));
    }

    #[test]
    fn duplicate_sub_fails_and_leaves_list_unchanged() {
        let store = Store::new([("a", 0_i64)]);
        let handler = counting_handler(&Arc::new(AtomicUsize::new(0)));

        store.sub("a", Arc::clone(&handler)).unwrap();
        let err = store.sub("a", Arc::clone(&handler)).unwrap_err();

        assert!(matches!(err, StoreError::DuplicateHandler(key) if key == "a"));
        assert_eq!(store.subscriber_count("a").unwrap(), 1);
    }

    #[test]
    fn unsub_without_sub_fails() {
        let store = Store::new([("a", 0_i64)]);
        let handler = counting_handler(&Arc::new(AtomicUsize::new(0)));

        let err = store.unsub("a", &handler).unwrap_err();

        assert!(matches!(err, StoreError::HandlerNotAttached(key) if key == "a"));
    }

    #[test]
    fn sub_unsub_pairs_restore_the_subscriber_list() {
        let store = Store::new([("a", 0_i64)]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let tagged = |tag: &'static str| -> PropertyHandler<i64> {
            let order = Arc::clone(&order);
            Arc::new(move |_, _| order.lock().unwrap().push(tag))
        };

        let keeper = tagged("keeper");
        let second = tagged("second");
        let third = tagged("third");

        store.sub("a", Arc::clone(&keeper)).unwrap();
        store.sub("a", Arc::clone(&second)).unwrap();
        store.sub("a", Arc::clone(&third)).unwrap();
        store.unsub("a", &third).unwrap();
        store.unsub("a", &second).unwrap();

        store.set("a", 1).unwrap();

        assert_eq!(store.subscriber_count("a").unwrap(), 1);
        assert_eq!(*order.lock().unwrap(), vec!["keeper"]);
    }

    #[test]
    fn subscriber_attached_mid_notification_runs_from_next_write() {
        let store = Arc::new(Store::new([("a", 0_i64)]));
        let late_calls = Arc::new(AtomicUsize::new(0));

        let attacher: PropertyHandler<i64> = {
            let store = Arc::clone(&store);
            let late_calls = Arc::clone(&late_calls);
            let attached = AtomicBool::new(false);
            Arc::new(move |_, _| {
                if !attached.swap(true, Ordering::SeqCst) {
                    store.sub("a", counting_handler(&late_calls)).unwrap();
                }
            })
        };
        store.sub("a", attacher).unwrap();

        store.set("a", 1).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        store.set("a", 2).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_keys_in_constructor_keep_the_last_value() {
        let store = Store::new([("a", 1_i64), ("a", 2_i64)]);

        assert_eq!(store.keys().count(), 1);
        assert_eq!(*store.get("a").unwrap(), 2);
    }

    #[test]
    fn values_are_shared_not_cloned() {
        let store = Store::new([("obj", json!({"foo": "bar"}))]);

        let first = store.get("obj").unwrap();
        let second = store.get("obj").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn heterogeneous_values_flow_through_all_write_paths() {
        let store = Store::new([
            ("name", json!("axon")),
            ("counter", json!(0)),
            ("tags", json!(["a", "b"])),
        ]);
        let log: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder: PropertyHandler<Value> = {
            let log = Arc::clone(&log);
            Arc::new(move |current, previous| {
                log.lock().unwrap().push((current.clone(), previous.clone()));
            })
        };
        store.sub("counter", recorder).unwrap();

        store.set("counter", json!(1)).unwrap();
        store
            .alt("counter", |n| {
                json!(n.as_i64().unwrap_or(0).saturating_add(1))
            })
            .unwrap();
        store.set_many([("counter", json!(5)), ("name", json!("renamed"))]).unwrap();

        assert_eq!(*store.get("name").unwrap(), json!("renamed"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (json!(1), json!(0)),
                (json!(2), json!(1)),
                (json!(5), json!(2)),
            ]
        );
    }

    #[test]
    fn introspection_tracks_registry_and_subscriptions() {
        let store = Store::new([("a", 0_i64), ("b", 0_i64)]);

        assert!(store.contains("a"));
        assert!(!store.contains("c"));
        assert_eq!(store.keys().count(), 2);

        let handler = counting_handler(&Arc::new(AtomicUsize::new(0)));
        store.sub("a", Arc::clone(&handler)).unwrap();
        assert_eq!(store.subscriber_count("a").unwrap(), 1);
        assert_eq!(store.subscriber_count("b").unwrap(), 0);

        store.unsub("a", &handler).unwrap();
        assert_eq!(store.subscriber_count("a").unwrap(), 0);

        assert!(matches!(
            store.subscriber_count("c").unwrap_err(),
            StoreError::UnknownProperty { .. }
        ));
    }
}
