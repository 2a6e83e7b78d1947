use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use log::{debug, error, info};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Accuracy, FixError, PositionSource};
use crate::model::{now_micros, Fix, NewSample, PositionSample, UtcDT};
use crate::prelude::*;
use crate::store::SampleStore;

/// How long a single fix request may take
pub const FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// Floor applied to the sampling interval
const MIN_INTERVAL: Duration = Duration::from_millis(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pushed to every subscriber of a [Sampler]
#[derive(Debug, Clone)]
pub enum SamplerEvent {
    /// A fix was accepted and persisted
    Sample(PositionSample),
    /// Persisting a sample failed. The loop has stopped.
    StoreFailed(Arc<anyhow::Error>),
}

pub type SubscriptionId = u64;

/// A registered observer. Events arrive in the order fixes were accepted.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<SamplerEvent>,
}

#[derive(Default)]
struct Observers {
    next_id: SubscriptionId,
    senders: HashMap<SubscriptionId, mpsc::UnboundedSender<SamplerEvent>>,
}

impl Observers {
    fn broadcast(&mut self, event: &SamplerEvent) {
        // Receivers that were dropped without unsubscribing get pruned here
        self.senders.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

struct ActiveLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveLoop {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

#[derive(Default)]
struct LoopSlot {
    active: Option<ActiveLoop>,
    /// Task of a stopped loop that may still be finishing its last insert
    stopped: Option<JoinHandle<()>>,
}

/// Periodically asks a [PositionSource] for a fix, persists accepted fixes to a
/// [SampleStore] and notifies subscribers.
///
/// At most one loop runs per sampler: a loop started right after [Sampler::stop]
/// waits for the stopped one to exit before requesting its first fix. Failed
/// fix requests are skipped silently, a failed insert stops the loop and is
/// reported as [SamplerEvent::StoreFailed].
pub struct Sampler<P: PositionSource> {
    runtime: Handle,
    source: Arc<P>,
    store: Arc<dyn SampleStore>,
    observers: Arc<Mutex<Observers>>,
    last_timestamp: Arc<Mutex<Option<UtcDT>>>,
    slot: Mutex<LoopSlot>,
}

impl<P: PositionSource> Sampler<P> {
    pub fn new(runtime: Handle, source: P, store: Arc<dyn SampleStore>) -> Self {
        Self {
            runtime,
            source: Arc::new(source),
            store,
            observers: Arc::default(),
            last_timestamp: Arc::default(),
            slot: Mutex::default(),
        }
    }

    /// Start sampling every `interval`. Does nothing if already running.
    pub fn start(&self, interval: Duration) {
        let mut slot = lock(&self.slot);
        if slot.active.as_ref().is_some_and(ActiveLoop::is_live) {
            debug!("Sampler already running, ignoring start");
            return;
        }
        let predecessor = slot.active.take().map(|old| old.handle).or_else(|| slot.stopped.take());

        let interval = interval.max(MIN_INTERVAL);
        let cancel = CancellationToken::new();
        let task = SampleLoop {
            source: self.source.clone(),
            store: self.store.clone(),
            observers: self.observers.clone(),
            last_timestamp: self.last_timestamp.clone(),
            cancel: cancel.clone(),
            interval,
        };

        let handle = self.runtime.spawn(task.run(predecessor));
        slot.active = Some(ActiveLoop { cancel, handle });
        info!("Sampler started, interval {interval:?}");
    }

    /// Signal the active loop to stop. Returns without waiting for it.
    pub fn stop(&self) {
        let mut slot = lock(&self.slot);
        if let Some(active) = slot.active.take() {
            active.cancel.cancel();
            slot.stopped = Some(active.handle);
            info!("Sampler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.slot).active.as_ref().is_some_and(ActiveLoop::is_live)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, events) = mpsc::unbounded_channel();
        let mut observers = lock(&self.observers);
        let id = observers.next_id;
        observers.next_id += 1;
        observers.senders.insert(id, tx);
        Subscription { id, events }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.observers).senders.remove(&id);
    }
}

impl<P: PositionSource> Drop for Sampler<P> {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.slot).active.take() {
            active.cancel.cancel();
        }
    }
}

/// State owned by one running loop
struct SampleLoop<P: PositionSource> {
    source: Arc<P>,
    store: Arc<dyn SampleStore>,
    observers: Arc<Mutex<Observers>>,
    last_timestamp: Arc<Mutex<Option<UtcDT>>>,
    cancel: CancellationToken,
    interval: Duration,
}

impl<P: PositionSource> SampleLoop<P> {
    async fn run(self, predecessor: Option<JoinHandle<()>>) {
        // Not cancellable, so a chain of quick stop/start calls still runs one loop at a time
        if let Some(previous) = predecessor {
            if let Err(why) = previous.await {
                debug!("Previous sampler loop ended abnormally: {why}");
            }
        }

        loop {
            let fix = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                fix = self.request_fix() => fix,
            };

            // A fix that lands after stop is dropped
            if self.cancel.is_cancelled() {
                break;
            }

            // Failed fix requests skip this tick
            if let Ok(fix) = fix {
                if let Err(why) = self.accept(fix).await {
                    error!("Stopping sampler, failed to persist sample: {why:?}");
                    self.cancel.cancel();
                    self.broadcast(&SamplerEvent::StoreFailed(Arc::new(why)));
                    break;
                }
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!("Sampler loop exited");
    }

    async fn request_fix(&self) -> Result<Fix, FixError> {
        tokio::time::timeout(FIX_TIMEOUT, self.source.get_fix(Accuracy::Best, FIX_TIMEOUT))
            .await
            .unwrap_or(Err(FixError::Timeout))
    }

    /// Persist on the blocking pool, then notify. Runs to completion once
    /// started so every stored sample is also announced.
    async fn accept(&self, fix: Fix) -> Result {
        let sample = NewSample::from_fix(fix, self.next_timestamp());
        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || store.insert(&sample))
            .await
            .context("Sample insert task failed")??;
        self.broadcast(&SamplerEvent::Sample(stored));
        Ok(())
    }

    /// Wall clock time, nudged forward if needed so timestamps strictly increase
    fn next_timestamp(&self) -> UtcDT {
        let mut last = lock(&self.last_timestamp);
        let now = now_micros();
        let ts = match *last {
            Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
            _ => now,
        };
        *last = Some(ts);
        ts
    }

    fn broadcast(&self, event: &SamplerEvent) {
        lock(&self.observers).broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::task::yield_now;

    use super::*;
    use crate::store::MemoryStore;
    use crate::tests::{FailingStore, ScriptedSource, SlowStore, Step};

    const INTERVAL: Duration = Duration::from_secs(10);

    /// Let spawned tasks run until they park on a timer. Paused time doesn't
    /// auto-advance while an insert is on the blocking pool.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Advance (paused) time and let the loop catch up
    async fn run_for(d: Duration) {
        tokio::time::sleep(d).await;
        settle().await;
    }

    fn sampler(source: ScriptedSource, store: Arc<dyn SampleStore>) -> Sampler<ScriptedSource> {
        Sampler::new(Handle::current(), source, store)
    }

    fn drain(sub: &mut Subscription) -> Vec<SamplerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = sub.events.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_runs_one_loop() {
        let source = ScriptedSource::always(Step::Fix);
        let calls = source.calls.clone();
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());

        sampler.start(INTERVAL);
        sampler.start(INTERVAL);
        settle().await;
        assert!(sampler.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Check between ticks so timer ties don't matter
        run_for(INTERVAL / 2).await;
        for expected in 2..=4 {
            run_for(INTERVAL).await;
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
        assert_eq!(store.list_all().unwrap().len(), 4);

        sampler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_start_resumes() {
        let source = ScriptedSource::always(Step::Fix);
        let calls = source.calls.clone();
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());
        let mut sub = sampler.subscribe();

        sampler.start(INTERVAL);
        settle().await;
        assert_eq!(drain(&mut sub).len(), 1);

        sampler.stop();
        assert!(!sampler.is_running());
        // Stopping twice is fine
        sampler.stop();

        run_for(INTERVAL * 5).await;
        assert!(drain(&mut sub).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_all().unwrap().len(), 1);

        sampler.start(INTERVAL);
        settle().await;
        assert!(sampler.is_running());
        assert_eq!(drain(&mut sub).len(), 1);
        assert_eq!(store.list_all().unwrap().len(), 2);

        sampler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_swallowed() {
        let source = ScriptedSource::always(Step::Fail(FixError::PermissionDenied));
        let calls = source.calls.clone();
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());
        let mut sub = sampler.subscribe();

        sampler.start(INTERVAL);
        settle().await;
        run_for(INTERVAL / 2).await;
        for _ in 0..9 {
            run_for(INTERVAL).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(store.list_all().unwrap().is_empty());
        assert!(drain(&mut sub).is_empty());
        assert!(sampler.is_running());

        sampler.stop();
        assert!(!sampler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_success_persists_and_notifies_once() {
        let source = ScriptedSource::new(
            vec![
                Step::Fail(FixError::ProviderDisabled),
                Step::Fix,
                Step::Fail(FixError::Unavailable("no satellites".into())),
            ],
            Step::Fail(FixError::Timeout),
        );
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());
        let mut sub = sampler.subscribe();

        let started = now_micros();
        sampler.start(INTERVAL);
        settle().await;
        run_for(INTERVAL / 2).await;
        for _ in 0..5 {
            run_for(INTERVAL).await;
        }
        sampler.stop();

        let stored = store.list_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].timestamp >= started);
        assert_eq!(stored[0].accuracy_meters, Some(4.0));

        let events = drain(&mut sub);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SamplerEvent::Sample(sample) => assert_eq!(*sample, stored[0]),
            other => panic!("Unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fix_times_out_and_loop_continues() {
        let source = ScriptedSource::new(vec![Step::Hang], Step::Fix);
        let calls = source.calls.clone();
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());

        sampler.start(INTERVAL);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Timeout, then one interval, then the next request succeeds
        run_for(FIX_TIMEOUT + INTERVAL + INTERVAL / 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert!(sampler.is_running());

        sampler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_pending_fix() {
        let source = ScriptedSource::new(vec![Step::Hang], Step::Fix);
        let calls = source.calls.clone();
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());

        sampler.start(INTERVAL);
        settle().await;
        sampler.stop();
        settle().await;

        run_for(FIX_TIMEOUT * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_stops_and_reports() {
        let source = ScriptedSource::always(Step::Fix);
        let calls = source.calls.clone();
        let sampler = sampler(source, Arc::new(FailingStore));
        let mut sub = sampler.subscribe();

        sampler.start(INTERVAL);
        settle().await;

        let events = drain(&mut sub);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SamplerEvent::StoreFailed(_)));
        assert!(!sampler.is_running());

        run_for(INTERVAL * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Can be restarted after the failure
        sampler.start(INTERVAL);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        sampler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_and_unsubscribe() {
        let source = ScriptedSource::always(Step::Fix);
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store);

        let mut kept = sampler.subscribe();
        let dropped = sampler.subscribe();
        let mut removed = sampler.subscribe();
        assert_ne!(kept.id, removed.id);

        drop(dropped);
        sampler.unsubscribe(removed.id);

        sampler.start(INTERVAL);
        settle().await;
        run_for(INTERVAL / 2).await;
        run_for(INTERVAL).await;
        sampler.stop();

        assert_eq!(drain(&mut kept).len(), 2);
        assert!(drain(&mut removed).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_strictly_increase() {
        let source = ScriptedSource::always(Step::Fix);
        let store = Arc::new(MemoryStore::new());
        let sampler = sampler(source, store.clone());

        // Paused time barely moves the wall clock, so the nudge kicks in
        sampler.start(Duration::ZERO);
        for _ in 0..20 {
            run_for(Duration::from_millis(1)).await;
        }
        sampler.stop();

        let stored = store.list_all().unwrap();
        assert!(stored.len() > 2);
        assert!(stored.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(stored.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_stopped_loop() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(50)));
        let sampler = sampler(ScriptedSource::always(Step::Fix), store.clone());
        let mut sub = sampler.subscribe();

        sampler.start(INTERVAL);
        // First loop is now waiting on its insert
        yield_now().await;
        sampler.stop();
        sampler.start(INTERVAL);
        assert!(sampler.is_running());

        settle().await;
        sampler.stop();

        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        let stored = store.list_all().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].id < stored[1].id);
        assert!(stored[0].timestamp < stored[1].timestamp);
        assert_eq!(drain(&mut sub).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_arriving_after_stop_is_dropped() {
        let source = ScriptedSource::always(Step::Fix);
        let on_fix = source.on_fix.clone();
        let store = Arc::new(MemoryStore::new());
        let sampler = Arc::new(sampler(source, store.clone()));
        let mut sub = sampler.subscribe();

        // Stop lands while the fix is being handed back
        let stopper = sampler.clone();
        *on_fix.lock().unwrap() = Some(Box::new(move || stopper.stop()));

        sampler.start(INTERVAL);
        settle().await;

        assert!(!sampler.is_running());
        assert!(store.list_all().unwrap().is_empty());
        assert!(drain(&mut sub).is_empty());
    }
}
