//! Registration Watch
//!
//! Change notifications for the registrations under one address, produced by
//! polling the store on a fixed delay and diffing against the last snapshot
//! seen.
//!
//! ```text
//!   Initial ──(S == initial)──────────────▶ Watching{S}
//!      │  └──(S != initial, non-empty)──▶ Watching{S} + update(S)
//!      └────(S empty)──────────────────▶ Terminated + end
//!
//!   Watching{last} ──(S == last)──▶ (no-op)
//!      │         └──(S empty)────▶ Terminated + end
//!      └───────────(otherwise)───▶ Watching{S} + update(S)
//! ```
//!
//! Handlers run outside the watch lock, so they may call back into the
//! watch (for example `stop()`).

use crate::cluster::ClusterContext;
use crate::error::{Error, Result};
use crate::registration::RegistrationSnapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives the full list of registrations after a change
pub type UpdateHandler = Arc<dyn Fn(RegistrationSnapshot) + Send + Sync>;

/// Receives the terminal event, once
pub type EndHandler = Arc<dyn Fn() + Send + Sync>;

// =============================================================================
// Watch State
// =============================================================================

/// Externally visible phase of a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// No snapshot has been diffed yet
    Initial,
    /// Waiting for the registrations to change
    Watching,
    /// Terminal event delivered, polling cancelled
    Terminated,
}

impl std::fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchPhase::Initial => write!(f, "initial"),
            WatchPhase::Watching => write!(f, "watching"),
            WatchPhase::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug)]
enum WatchState {
    Initial,
    Watching { last: RegistrationSnapshot },
    Terminated,
}

impl WatchState {
    fn phase(&self) -> WatchPhase {
        match self {
            WatchState::Initial => WatchPhase::Initial,
            WatchState::Watching { .. } => WatchPhase::Watching,
            WatchState::Terminated => WatchPhase::Terminated,
        }
    }
}

/// What a tick has to deliver once the lock is released
enum Emission {
    Update(Option<UpdateHandler>, RegistrationSnapshot),
    End(Option<EndHandler>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Stop,
}

struct WatchCore {
    state: WatchState,
    update_handler: Option<UpdateHandler>,
    end_handler: Option<EndHandler>,
    started: bool,
}

// =============================================================================
// Watch Internals
// =============================================================================

struct WatchInner {
    address: String,
    ctx: Arc<ClusterContext>,
    initial: RegistrationSnapshot,
    core: Mutex<WatchCore>,
    cancel: CancellationToken,
    ticks: AtomicU64,
}

impl WatchInner {
    /// Advance the state machine with snapshot `current`
    fn transition(&self, current: RegistrationSnapshot) -> Option<Emission> {
        let mut core = self.core.lock();
        let previous = std::mem::replace(&mut core.state, WatchState::Terminated);

        let (next, emission) = match previous {
            WatchState::Initial if current.is_empty() => {
                (WatchState::Terminated, Some(Emission::End(core.end_handler.clone())))
            }
            WatchState::Initial if current != self.initial => {
                let emission = Emission::Update(core.update_handler.clone(), current.clone());
                (WatchState::Watching { last: current }, Some(emission))
            }
            WatchState::Initial => (WatchState::Watching { last: current }, None),
            WatchState::Watching { last } if last == current => {
                (WatchState::Watching { last }, None)
            }
            WatchState::Watching { .. } if current.is_empty() => {
                (WatchState::Terminated, Some(Emission::End(core.end_handler.clone())))
            }
            WatchState::Watching { .. } => {
                let emission = Emission::Update(core.update_handler.clone(), current.clone());
                (WatchState::Watching { last: current }, Some(emission))
            }
            WatchState::Terminated => (WatchState::Terminated, None),
        };

        core.state = next;
        emission
    }

    /// One poll: snapshot, diff, deliver
    fn check_update(&self) -> TickOutcome {
        let current = self.ctx.registrations().snapshot(&self.address);
        self.ticks.fetch_add(1, Ordering::Relaxed);

        match self.transition(current) {
            None => {}
            Some(Emission::Update(handler, snapshot)) => {
                debug!(address = %self.address, registrations = snapshot.len(), "Registrations changed");
                if let Some(handler) = handler {
                    handler(snapshot);
                }
            }
            Some(Emission::End(handler)) => {
                debug!(address = %self.address, "No registrations left, ending watch");
                self.cancel.cancel();
                if let Some(handler) = handler {
                    handler();
                }
            }
        }

        if self.phase() == WatchPhase::Terminated {
            TickOutcome::Stop
        } else {
            TickOutcome::Continue
        }
    }

    fn phase(&self) -> WatchPhase {
        self.core.lock().state.phase()
    }
}

async fn poll_loop(inner: Arc<WatchInner>) {
    let interval = inner.ctx.config().poll_interval;

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let tick = Arc::clone(&inner);
        match inner.ctx.workers().run(move || tick.check_update()).await {
            Ok(TickOutcome::Continue) => {}
            Ok(TickOutcome::Stop) => break,
            Err(e) => {
                warn!(address = %inner.address, error = %e, "Registration handler failed");
                if inner.phase() == WatchPhase::Terminated {
                    break;
                }
            }
        }
    }

    inner.cancel.cancel();
    debug!(
        address = %inner.address,
        ticks = inner.ticks.load(Ordering::Relaxed),
        "Registration watch stopped"
    );
}

// =============================================================================
// Registration Watch
// =============================================================================

/// Subscription to the registrations under one address
///
/// Cloning yields another handle to the same subscription.
#[derive(Clone)]
pub struct RegistrationWatch {
    inner: Arc<WatchInner>,
}

impl std::fmt::Debug for RegistrationWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationWatch")
            .field("address", &self.inner.address)
            .field("phase", &self.phase())
            .finish()
    }
}

impl RegistrationWatch {
    /// Create a watch, capturing the current registrations as its initial state
    pub fn new(ctx: Arc<ClusterContext>, address: impl Into<String>) -> Self {
        let address = address.into();
        let initial = ctx.registrations().snapshot(&address);

        Self {
            inner: Arc::new(WatchInner {
                address,
                ctx,
                initial,
                core: Mutex::new(WatchCore {
                    state: WatchState::Initial,
                    update_handler: None,
                    end_handler: None,
                    started: false,
                }),
                cancel: CancellationToken::new(),
                ticks: AtomicU64::new(0),
            }),
        }
    }

    /// Address being watched
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Registrations at the time the watch was created
    pub fn initial_state(&self) -> &RegistrationSnapshot {
        &self.inner.initial
    }

    /// Set the handler for changed registrations
    pub fn set_update_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(RegistrationSnapshot) + Send + Sync + 'static,
    {
        self.inner.core.lock().update_handler = Some(Arc::new(handler));
        self
    }

    /// Set the handler for the terminal event
    pub fn set_end_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.core.lock().end_handler = Some(Arc::new(handler));
        self
    }

    /// Start polling. Has no effect if the watch was already started or stopped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;

        {
            let mut core = self.inner.core.lock();
            if core.started || self.inner.cancel.is_cancelled() {
                return Ok(());
            }
            core.started = true;
        }

        handle.spawn(poll_loop(Arc::clone(&self.inner)));
        debug!(address = %self.inner.address, "Registration watch started");
        Ok(())
    }

    /// Cancel future polls. Idempotent; safe to call from a handler.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether polling has been cancelled (by `stop()` or the terminal event)
    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Current phase of the state machine
    pub fn phase(&self) -> WatchPhase {
        self.inner.phase()
    }

    /// Polls performed so far
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterConfig;
    use crate::registration::RegistrationInfo;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    fn info(node: &str, endpoint: &str) -> RegistrationInfo {
        RegistrationInfo::new(node, endpoint)
    }

    fn context(poll_ms: u64) -> Arc<ClusterContext> {
        ClusterContext::with_config(
            ClusterConfig::default().with_poll_interval(Duration::from_millis(poll_ms)),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<RegistrationSnapshot>>,
        ends: AtomicU64,
    }

    fn record(watch: &RegistrationWatch) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        let r = Arc::clone(&recorder);
        watch.set_update_handler(move |snapshot| r.updates.lock().push(snapshot));
        let r = Arc::clone(&recorder);
        watch.set_end_handler(move || {
            r.ends.fetch_add(1, Ordering::SeqCst);
        });
        recorder
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            sleep(Duration::from_millis(2)).await;
        }
    }

    #[test]
    fn test_transition_table() {
        let ctx = ClusterContext::new();
        ctx.registrations().register("a", info("n1", "v1"));
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "a");
        let inner = &watch.inner;

        // equal to initial: silent move to Watching
        assert!(inner.transition(vec![info("n1", "v1")]).is_none());
        assert_eq!(watch.phase(), WatchPhase::Watching);

        // equal to last: no-op
        assert!(inner.transition(vec![info("n1", "v1")]).is_none());

        // changed: update
        let emission = inner.transition(vec![info("n1", "v1"), info("n2", "v2")]);
        assert!(matches!(emission, Some(Emission::Update(None, ref s)) if s.len() == 2));

        // order matters
        let emission = inner.transition(vec![info("n2", "v2"), info("n1", "v1")]);
        assert!(matches!(emission, Some(Emission::Update(..))));

        // empty: terminal, then nothing ever again
        assert!(matches!(inner.transition(vec![]), Some(Emission::End(None))));
        assert_eq!(watch.phase(), WatchPhase::Terminated);
        assert!(inner.transition(vec![info("n1", "v1")]).is_none());
        assert!(inner.transition(vec![]).is_none());
    }

    #[test]
    fn test_initial_differs_emits_update() {
        let ctx = ClusterContext::new();
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "a");
        assert!(watch.initial_state().is_empty());

        let emission = watch.inner.transition(vec![info("n1", "v1")]);
        assert!(matches!(emission, Some(Emission::Update(None, _))));
        assert_eq!(watch.phase(), WatchPhase::Watching);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_address_ends_once() {
        let ctx = context(5);
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "svc.none");
        let recorder = record(&watch);
        watch.start().unwrap();

        wait_until(|| recorder.ends.load(Ordering::SeqCst) == 1).await;
        assert!(watch.is_stopped());
        assert_eq!(watch.phase(), WatchPhase::Terminated);

        // later registrations are never reported
        ctx.registrations().register("svc.none", info("n1", "v1"));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
        assert!(recorder.updates.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_echo_scenario() {
        let ctx = context(5);
        let store = ctx.registrations();
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "svc.echo");
        assert_eq!(watch.initial_state(), &Vec::<RegistrationInfo>::new());

        let recorder = record(&watch);
        store.register("svc.echo", info("node1", "v1"));
        watch.start().unwrap();

        wait_until(|| recorder.updates.lock().len() == 1).await;
        assert_eq!(recorder.updates.lock()[0], vec![info("node1", "v1")]);

        store.register("svc.echo", info("node2", "v2"));
        wait_until(|| recorder.updates.lock().len() == 2).await;
        assert_eq!(
            recorder.updates.lock()[1],
            vec![info("node1", "v1"), info("node2", "v2")]
        );

        store.unregister("svc.echo", &info("node1", "v1")).unwrap();
        store.unregister("svc.echo", &info("node2", "v2")).unwrap();
        wait_until(|| recorder.ends.load(Ordering::SeqCst) == 1).await;

        let ticks = watch.ticks();
        sleep(Duration::from_millis(40)).await;
        assert_eq!(watch.ticks(), ticks);
        assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_changes_within_one_tick_coalesce() {
        let ctx = context(150);
        let store = ctx.registrations();
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "svc.batch");
        let recorder = record(&watch);
        watch.start().unwrap();

        store.register("svc.batch", info("node1", "v1"));
        store.register("svc.batch", info("node2", "v2"));

        wait_until(|| !recorder.updates.lock().is_empty()).await;
        sleep(Duration::from_millis(20)).await;

        let updates = recorder.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], vec![info("node1", "v1"), info("node2", "v2")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unchanged_initial_state_is_silent() {
        let ctx = context(5);
        ctx.registrations().register("a", info("n1", "v1"));
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "a");
        let recorder = record(&watch);
        watch.start().unwrap();

        wait_until(|| watch.ticks() >= 3).await;
        assert!(recorder.updates.lock().is_empty());
        assert_eq!(watch.phase(), WatchPhase::Watching);
        watch.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_from_handler() {
        let ctx = context(5);
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "a");
        let calls = Arc::new(AtomicU64::new(0));

        let handle = watch.clone();
        let c = Arc::clone(&calls);
        watch.set_update_handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            handle.stop();
            handle.stop();
        });
        ctx.registrations().register("a", info("n1", "v1"));
        watch.start().unwrap();

        wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
        ctx.registrations().register("a", info("n2", "v2"));
        sleep(Duration::from_millis(40)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(watch.is_stopped());
        assert_eq!(watch.phase(), WatchPhase::Watching);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_handler_keeps_polling() {
        let ctx = context(5);
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "a");
        let ends = Arc::new(AtomicU64::new(0));
        watch.set_update_handler(|_| panic!("handler failure"));
        let e = Arc::clone(&ends);
        watch.set_end_handler(move || {
            e.fetch_add(1, Ordering::SeqCst);
        });

        ctx.registrations().register("a", info("n1", "v1"));
        watch.start().unwrap();
        wait_until(|| watch.phase() == WatchPhase::Watching).await;

        ctx.registrations().unregister("a", &info("n1", "v1")).unwrap();
        wait_until(|| ends.load(Ordering::SeqCst) == 1).await;
        assert!(watch.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handler_attached_after_start_sees_only_later_changes() {
        let ctx = context(5);
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "late");
        ctx.registrations().register("late", info("n1", "v1"));
        watch.start().unwrap();

        // first update fires with no handler installed
        wait_until(|| watch.phase() == WatchPhase::Watching).await;

        let recorder = record(&watch);
        sleep(Duration::from_millis(30)).await;
        assert!(recorder.updates.lock().is_empty());

        ctx.registrations().register("late", info("n2", "v2"));
        wait_until(|| recorder.updates.lock().len() == 1).await;
        sleep(Duration::from_millis(30)).await;

        let updates = recorder.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], vec![info("n1", "v1"), info("n2", "v2")]);
        drop(updates);
        watch.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replaced_end_handler_is_the_one_called() {
        let ctx = context(5);
        ctx.registrations().register("swap", info("n1", "v1"));
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "swap");
        let first = record(&watch);
        watch.start().unwrap();
        wait_until(|| watch.ticks() >= 2).await;

        let second = record(&watch);
        ctx.registrations().unregister("swap", &info("n1", "v1")).unwrap();
        wait_until(|| second.ends.load(Ordering::SeqCst) == 1).await;

        sleep(Duration::from_millis(20)).await;
        assert_eq!(first.ends.load(Ordering::SeqCst), 0);
        assert_eq!(second.ends.load(Ordering::SeqCst), 1);
        assert_eq!(watch.phase(), WatchPhase::Terminated);
    }

    #[tokio::test]
    async fn test_start_after_stop_is_noop() {
        let ctx = context(5);
        let watch = RegistrationWatch::new(Arc::clone(&ctx), "a");
        watch.stop();
        watch.start().unwrap();

        sleep(Duration::from_millis(30)).await;
        assert_eq!(watch.ticks(), 0);
        assert_eq!(watch.phase(), WatchPhase::Initial);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let ctx = ClusterContext::new();
        let watch = RegistrationWatch::new(ctx, "a");
        assert!(matches!(watch.start(), Err(Error::Runtime(_))));
    }
}
