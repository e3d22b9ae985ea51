//! Fan-out of decoded snapshots from the single upstream connection to every view.
//!
//! Readers are trait objects behind their own mutex. The hub never holds its registry
//! lock while a reader runs, so a reader may be registered or removed from another task
//! during a dispatch. Removal waits for an in-flight delivery to that reader to finish;
//! once [`Hub::unsubscribe`] returns the reader sees nothing more.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::decode::decode_frame;
use crate::error::{ConnectionError, ReaderError};
use crate::types::Snapshot;

/// Consumer of the snapshot stream.
///
/// `on_snapshot` runs synchronously on the dispatching task and must not block. A reader
/// must not unsubscribe itself from inside its own callback; that would wait on its own
/// lock.
pub trait Reader: Send {
    fn name(&self) -> &str;

    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError>;

    /// Connection state changes. Default: ignore.
    fn on_state(&mut self, _state: &ConnectionState) {}
}

pub type SharedReader = Arc<Mutex<dyn Reader>>;

/// Wrap a reader for registration, keeping a typed handle for the caller.
pub fn shared<R: Reader + 'static>(reader: R) -> Arc<Mutex<R>> {
    Arc::new(Mutex::new(reader))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected or connecting, nothing received yet.
    Waiting,
    Live,
    /// Terminal. No reconnect happens inside the hub.
    Closed(ConnectionError),
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Live)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReaderId(u64);

struct Slot {
    reader: SharedReader,
    active: Arc<AtomicBool>,
}

impl Clone for Slot {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            active: Arc::clone(&self.active),
        }
    }
}

struct Registry {
    next_id: u64,
    slots: BTreeMap<ReaderId, Slot>,
    state: ConnectionState,
}

/// Counters for diagnostics. Monotonic for the lifetime of the hub.
#[derive(Debug, Default)]
pub struct HubStats {
    dispatched: AtomicU64,
    deliveries: AtomicU64,
    decode_failures: AtomicU64,
    reader_errors: AtomicU64,
}

impl HubStats {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }
    pub fn reader_errors(&self) -> u64 {
        self.reader_errors.load(Ordering::Relaxed)
    }
}

/// The shared subscription point. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<Mutex<Registry>>,
    stats: Arc<HubStats>,
    teardown: Arc<Notify>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                slots: BTreeMap::new(),
                state: ConnectionState::Waiting,
            })),
            stats: Arc::new(HubStats::default()),
            teardown: Arc::new(Notify::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a reader. It receives every snapshot dispatched after this returns.
    pub fn subscribe(&self, reader: SharedReader) -> Subscription {
        let mut reg = self.registry();
        let id = ReaderId(reg.next_id);
        reg.next_id += 1;
        reg.slots.insert(
            id,
            Slot {
                reader,
                active: Arc::new(AtomicBool::new(true)),
            },
        );
        debug!("reader {:?} registered ({} total)", id, reg.slots.len());
        Subscription {
            hub: self.clone(),
            id: Some(id),
        }
    }

    /// Remove a reader. Blocks until any delivery already running on it has finished.
    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ReaderId) -> bool {
        let (slot, now_empty) = {
            let mut reg = self.registry();
            let slot = reg.slots.remove(&id);
            (slot, reg.slots.is_empty())
        };
        let Some(slot) = slot else {
            return false;
        };
        slot.active.store(false, Ordering::SeqCst);
        // wait out an in-flight delivery
        drop(lock_reader(&slot.reader));
        debug!("reader {:?} removed", id);
        if now_empty {
            info!("last reader gone, requesting upstream teardown");
            self.teardown.notify_one();
        }
        true
    }

    pub fn reader_count(&self) -> usize {
        self.registry().slots.len()
    }

    pub fn state(&self) -> ConnectionState {
        self.registry().state.clone()
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    /// Deliver one snapshot to every registered reader, exactly once each.
    ///
    /// Returns the number of readers that processed it successfully. Ignored once closed.
    pub fn dispatch(&self, snapshot: &Snapshot) -> usize {
        let (slots, went_live) = {
            let mut reg = self.registry();
            if reg.state.is_closed() {
                return 0;
            }
            let went_live = reg.state == ConnectionState::Waiting;
            if went_live {
                reg.state = ConnectionState::Live;
            }
            let slots: Vec<(ReaderId, Slot)> =
                reg.slots.iter().map(|(id, s)| (*id, s.clone())).collect();
            (slots, went_live)
        };

        if went_live {
            info!("upstream is live");
            self.notify_state(&slots, &ConnectionState::Live);
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut ok = 0;
        for (id, slot) in &slots {
            let mut reader = lock_reader(&slot.reader);
            if !slot.active.load(Ordering::SeqCst) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| reader.on_snapshot(snapshot)));
            match outcome {
                Ok(Ok(())) => {
                    ok += 1;
                    self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    self.stats.reader_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("reader {} ({:?}) failed: {}", reader.name(), id, e);
                }
                Err(_) => {
                    self.stats.reader_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("reader {} ({:?}) panicked while processing a snapshot", reader.name(), id);
                }
            }
        }
        ok
    }

    /// Decode a raw text frame and dispatch whatever decodes. Malformed messages are
    /// counted, logged and dropped. Returns the number of snapshots dispatched.
    pub fn ingest(&self, frame: &str) -> usize {
        let mut dispatched = 0;
        for result in decode_frame(frame, Utc::now()) {
            match result {
                Ok(snapshot) => {
                    self.dispatch(&snapshot);
                    dispatched += 1;
                }
                Err(e) => {
                    self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("dropping malformed message: {}", e);
                }
            }
        }
        dispatched
    }

    /// Enter the terminal closed state and tell every reader. Only the first call wins.
    pub fn close(&self, err: ConnectionError) {
        let slots = {
            let mut reg = self.registry();
            if reg.state.is_closed() {
                return;
            }
            reg.state = ConnectionState::Closed(err.clone());
            reg.slots
                .iter()
                .map(|(id, s)| (*id, s.clone()))
                .collect::<Vec<_>>()
        };
        warn!("upstream closed: {}", err);
        self.notify_state(&slots, &ConnectionState::Closed(err));
    }

    /// Ask the connection owner to close the socket.
    pub fn shutdown(&self) {
        self.teardown.notify_one();
    }

    /// Resolves when the last reader deregisters or [`Hub::shutdown`] is called.
    pub async fn teardown_requested(&self) {
        self.teardown.notified().await
    }

    fn notify_state(&self, slots: &[(ReaderId, Slot)], state: &ConnectionState) {
        for (id, slot) in slots {
            let mut reader = lock_reader(&slot.reader);
            if !slot.active.load(Ordering::SeqCst) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| reader.on_state(state))).is_err() {
                warn!("reader {:?} panicked on state change", id);
            }
        }
    }
}

fn lock_reader(reader: &SharedReader) -> MutexGuard<'_, dyn Reader + 'static> {
    reader.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII registration handle. Dropping it unsubscribes.
pub struct Subscription {
    hub: Hub,
    id: Option<ReaderId>,
}

impl Subscription {
    pub fn id(&self) -> Option<ReaderId> {
        self.id
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.hub.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Counter {
        name: String,
        seen: Vec<Option<f64>>,
        states: Vec<ConnectionState>,
        fail: bool,
        panic: bool,
    }

    impl Counter {
        fn named(name: &str) -> Self {
            Self {
                name: name.into(),
                ..Default::default()
            }
        }
    }

    impl Reader for Counter {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError> {
            if self.panic {
                panic!("reader blew up");
            }
            self.seen.push(snapshot.cpu);
            if self.fail {
                return Err(ReaderError::new("nope"));
            }
            Ok(())
        }

        fn on_state(&mut self, state: &ConnectionState) {
            self.states.push(state.clone());
        }
    }

    fn cpu(v: f64) -> Snapshot {
        Snapshot {
            cpu: Some(v),
            ..Default::default()
        }
    }

    #[test]
    fn every_reader_gets_each_snapshot_once() {
        let hub = Hub::new();
        let readers: Vec<_> = (0..5).map(|i| shared(Counter::named(&format!("r{i}")))).collect();
        let _subs: Vec<_> = readers.iter().map(|r| hub.subscribe(r.clone())).collect();

        assert_eq!(hub.dispatch(&cpu(1.0)), 5);
        assert_eq!(hub.dispatch(&cpu(2.0)), 5);
        for r in &readers {
            assert_eq!(r.lock().unwrap().seen, vec![Some(1.0), Some(2.0)]);
        }
        assert_eq!(hub.stats().dispatched(), 2);
        assert_eq!(hub.stats().deliveries(), 10);
    }

    #[test]
    fn failing_and_panicking_readers_do_not_block_others() {
        let hub = Hub::new();
        let bad = shared(Counter {
            fail: true,
            ..Counter::named("bad")
        });
        let boom = shared(Counter {
            panic: true,
            ..Counter::named("boom")
        });
        let good = shared(Counter::named("good"));
        let _a = hub.subscribe(bad.clone());
        let _b = hub.subscribe(boom.clone());
        let _c = hub.subscribe(good.clone());

        assert_eq!(hub.dispatch(&cpu(3.0)), 1);
        assert_eq!(hub.dispatch(&cpu(4.0)), 1);
        assert_eq!(good.lock().unwrap().seen, vec![Some(3.0), Some(4.0)]);
        assert_eq!(bad.lock().unwrap().seen.len(), 2);
        assert_eq!(hub.stats().reader_errors(), 4);
    }

    #[test]
    fn malformed_frame_between_good_ones() {
        let hub = Hub::new();
        let r = shared(Counter::named("r"));
        let _s = hub.subscribe(r.clone());
        assert_eq!(hub.ingest(r#"{"cpu": 10}"#), 1);
        assert_eq!(hub.ingest("{not json"), 0);
        assert_eq!(hub.ingest(r#"{"cpu": "20%"}"#), 1);
        assert_eq!(r.lock().unwrap().seen, vec![Some(10.0), Some(20.0)]);
        assert_eq!(hub.stats().decode_failures(), 1);
        assert!(hub.state().is_live());
    }

    #[test]
    fn late_reader_starts_from_next_snapshot() {
        let hub = Hub::new();
        let early = shared(Counter::named("early"));
        let _e = hub.subscribe(early.clone());
        hub.dispatch(&cpu(1.0));
        let late = shared(Counter::named("late"));
        let _l = hub.subscribe(late.clone());
        hub.dispatch(&cpu(2.0));
        assert_eq!(late.lock().unwrap().seen, vec![Some(2.0)]);
        assert_eq!(early.lock().unwrap().seen.len(), 2);
    }

    #[test]
    fn dropped_subscription_receives_nothing_more() {
        let hub = Hub::new();
        let r = shared(Counter::named("r"));
        let keep = shared(Counter::named("keep"));
        let sub = hub.subscribe(r.clone());
        let _k = hub.subscribe(keep.clone());
        hub.dispatch(&cpu(1.0));
        drop(sub);
        assert_eq!(hub.reader_count(), 1);
        hub.dispatch(&cpu(2.0));
        assert_eq!(r.lock().unwrap().seen, vec![Some(1.0)]);
        assert_eq!(keep.lock().unwrap().seen.len(), 2);
    }

    #[test]
    fn unsubscribe_unknown_id_is_false() {
        let hub = Hub::new();
        let r = shared(Counter::named("r"));
        let sub = hub.subscribe(r);
        let id = sub.id().unwrap();
        sub.cancel();
        assert!(!hub.unsubscribe(id));
    }

    #[test]
    fn state_transitions_reach_readers() {
        let hub = Hub::new();
        let r = shared(Counter::named("r"));
        let _s = hub.subscribe(r.clone());
        assert_eq!(hub.state(), ConnectionState::Waiting);
        hub.dispatch(&cpu(1.0));
        hub.close(ConnectionError::ClosedByPeer);
        hub.close(ConnectionError::Shutdown);
        assert_eq!(
            hub.state(),
            ConnectionState::Closed(ConnectionError::ClosedByPeer)
        );
        assert_eq!(
            r.lock().unwrap().states,
            vec![
                ConnectionState::Live,
                ConnectionState::Closed(ConnectionError::ClosedByPeer)
            ]
        );
        // closed is terminal
        assert_eq!(hub.dispatch(&cpu(2.0)), 0);
        assert_eq!(r.lock().unwrap().seen.len(), 1);
    }

    #[test]
    fn closed_before_data_is_distinct_from_waiting() {
        let hub = Hub::new();
        hub.close(ConnectionError::Connect("refused".into()));
        assert!(hub.state().is_closed());
        assert!(!hub.state().is_live());
    }

    #[tokio::test]
    async fn last_unsubscribe_requests_teardown() {
        let hub = Hub::new();
        let a = hub.subscribe(shared(Counter::named("a")));
        let b = hub.subscribe(shared(Counter::named("b")));
        drop(a);
        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.teardown_requested().await })
        };
        drop(b);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("teardown not requested")
            .unwrap();
    }

    #[test]
    fn concurrent_unsubscribe_during_dispatch() {
        let hub = Hub::new();
        let readers: Vec<_> = (0..8).map(|i| shared(Counter::named(&format!("r{i}")))).collect();
        let mut subs: Vec<_> = readers.iter().map(|r| Some(hub.subscribe(r.clone()))).collect();

        let h2 = hub.clone();
        let pump = std::thread::spawn(move || {
            for i in 0..200 {
                h2.dispatch(&cpu(i as f64));
            }
        });
        for s in subs.iter_mut().step_by(2) {
            s.take();
        }
        pump.join().unwrap();

        // removed readers stop at some prefix; kept readers saw everything in order
        for (i, r) in readers.iter().enumerate() {
            let seen = &r.lock().unwrap().seen;
            let expected: Vec<_> = (0..seen.len()).map(|v| Some(v as f64)).collect();
            assert_eq!(*seen, expected);
            if i % 2 == 1 {
                assert_eq!(seen.len(), 200);
            }
        }
    }
}
