//! Dispatcher tests
//!
//! Timing tests run against a manual clock and a manual scheduler so they are
//! deterministic; a couple of tests exercise the real tokio timer queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use osc_core::{Bundle, Encode, Message, Packet, TimeTag};
use osc_dispatch::{
    Clock, DispatchSummary, Dispatcher, DispatcherConfig, Job, ManualClock, Result, Schedule,
};
use parking_lot::Mutex;

/// Holds jobs until the test releases the ones that are due
struct ManualScheduler {
    clock: Arc<ManualClock>,
    jobs: Mutex<Vec<(SystemTime, Job)>>,
}

impl ManualScheduler {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            jobs: Mutex::new(Vec::new()),
        }
    }

    fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run every job due at the current clock reading
    fn run_due(&self) {
        let now = self.clock.now();
        let due: Vec<Job> = {
            let mut jobs = self.jobs.lock();
            let (due, later): (Vec<_>, Vec<_>) = jobs.drain(..).partition(|(at, _)| *at <= now);
            *jobs = later;
            due.into_iter().map(|(_, job)| job).collect()
        };
        for job in due {
            job();
        }
    }
}

impl Schedule for ManualScheduler {
    fn after(&self, delay: Duration, job: Job) -> Result<()> {
        self.jobs.lock().push((self.clock.now() + delay, job));
        Ok(())
    }

    fn cancel_all(&self) {
        self.jobs.lock().clear();
    }
}

fn start() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

fn manual() -> (Dispatcher, Arc<ManualClock>, Arc<ManualScheduler>) {
    let clock = Arc::new(ManualClock::new(start()));
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let dispatcher = Dispatcher::with_parts(
        DispatcherConfig::default(),
        clock.clone(),
        scheduler.clone(),
    );
    (dispatcher, clock, scheduler)
}

fn msg(addr: &str) -> Message {
    Message::new(addr, vec![]).unwrap()
}

fn recorder(dispatcher: &Dispatcher, pattern: &str) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    dispatcher
        .register(pattern, move |msg| {
            sink.lock().push(msg.address().to_string());
            Ok(())
        })
        .unwrap();
    seen
}

// ============================================================================
// Message routing
// ============================================================================

#[test]
fn test_handlers_run_in_registration_order() {
    let (d, _, _) = manual();
    let order = Arc::new(Mutex::new(Vec::new()));

    for (label, pattern) in [(1, "/a/*"), (2, "/a/b"), (3, "/a/{b,c}"), (4, "/x")] {
        let order = Arc::clone(&order);
        d.register(pattern, move |_| {
            order.lock().push(label);
            Ok(())
        })
        .unwrap();
    }

    let summary = d.dispatch(msg("/a/b").into());

    assert_eq!(*order.lock(), vec![1, 2, 3]);
    assert_eq!(summary.delivered, 3);
}

#[test]
fn test_register_any_sees_everything() {
    let (d, _, _) = manual();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    d.register_any(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    d.dispatch(msg("/one").into());
    d.dispatch(msg("/two/three").into());

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_arguments_reach_handler() {
    let (d, _, _) = manual();
    let got = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&got);
    d.register("/synth/freq", move |msg| {
        *sink.lock() = msg.args().first().and_then(|v| v.as_float());
        Ok(())
    })
    .unwrap();

    let message = msg("/synth/freq").arg(440.0f32);
    d.dispatch(message.into());

    assert_eq!(*got.lock(), Some(440.0));
}

#[test]
fn test_failing_handler_does_not_block_siblings() {
    let (d, _, _) = manual();
    d.register("/a", |_| anyhow::bail!("handler error")).unwrap();
    d.register("/a", |_| panic!("handler panic")).unwrap();
    let seen = recorder(&d, "/a");

    let summary = d.dispatch(msg("/a").into());

    assert_eq!(*seen.lock(), vec!["/a"]);
    assert_eq!(
        summary,
        DispatchSummary {
            delivered: 1,
            failed: 2,
            deferred: 0
        }
    );
}

#[test]
fn test_handler_may_register_during_dispatch() {
    let (d, _, _) = manual();
    let inner = d.clone();
    d.register("/setup", move |_| {
        inner.register_any(|_| Ok(()));
        Ok(())
    })
    .unwrap();

    d.dispatch(msg("/setup").into());
    assert_eq!(d.len(), 2);
}

// ============================================================================
// Raw bytes
// ============================================================================

#[test]
fn test_dispatch_bytes() {
    let (d, _, _) = manual();
    let seen = recorder(&d, "/foo/*");

    let bytes = msg("/foo/bar").arg(1i32).encode().unwrap();
    let summary = d.dispatch_bytes(&bytes).unwrap();

    assert_eq!(summary.delivered, 1);
    assert_eq!(*seen.lock(), vec!["/foo/bar"]);
}

#[test]
fn test_decode_failure_only_drops_that_packet() {
    let (d, _, _) = manual();
    let seen = recorder(&d, "/ok");

    // Unknown type tag 'x'
    assert!(d.dispatch_bytes(b"/ok\0,x\0\0\0\0\0\0").is_err());
    // Truncated int argument
    assert!(d.dispatch_bytes(b"/ok\0,i\0\0\0\0").is_err());
    assert!(seen.lock().is_empty());

    let bytes = msg("/ok").encode().unwrap();
    d.dispatch_bytes(&bytes).unwrap();
    assert_eq!(*seen.lock(), vec!["/ok"]);
}

// ============================================================================
// Bundle timing
// ============================================================================

#[test]
fn test_immediate_bundle_is_synchronous() {
    let (d, _, scheduler) = manual();
    let seen = recorder(&d, "/*");

    let bundle = Bundle::immediate(vec![msg("/a").into(), msg("/b").into()]);
    let summary = d.dispatch(bundle.into());

    assert_eq!(summary.delivered, 2);
    assert_eq!(*seen.lock(), vec!["/a", "/b"]);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_past_bundle_is_synchronous() {
    let (d, _, scheduler) = manual();
    let seen = recorder(&d, "/*");

    let past = start() - Duration::from_secs(10);
    let bundle = Bundle::at(past, vec![msg("/late").into()]).unwrap();
    d.dispatch(bundle.into());

    assert_eq!(*seen.lock(), vec!["/late"]);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_future_bundle_waits_until_due() {
    let (d, clock, scheduler) = manual();
    let seen = recorder(&d, "/*");

    let due = start() + Duration::from_secs(5);
    let bundle = Bundle::at(due, vec![msg("/a").into(), msg("/b").into(), msg("/c").into()])
        .unwrap();
    let summary = d.dispatch(bundle.into());

    assert_eq!(summary.deferred, 1);
    assert_eq!(summary.delivered, 0);
    assert!(seen.lock().is_empty());

    clock.advance(Duration::from_secs(4));
    scheduler.run_due();
    assert!(seen.lock().is_empty());

    clock.advance(Duration::from_secs(1));
    scheduler.run_due();
    assert_eq!(*seen.lock(), vec!["/a", "/b", "/c"]);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_nested_bundle_checks_its_own_time() {
    let (d, clock, scheduler) = manual();
    let seen = recorder(&d, "/*");

    let inner = Bundle::at(start() + Duration::from_secs(3), vec![msg("/inner").into()]).unwrap();
    let outer = Bundle::at(
        start() + Duration::from_secs(1),
        vec![msg("/outer").into(), inner.into()],
    )
    .unwrap();
    d.dispatch(outer.into());

    clock.advance(Duration::from_secs(1));
    scheduler.run_due();
    assert_eq!(*seen.lock(), vec!["/outer"]);
    assert_eq!(scheduler.pending(), 1);

    clock.advance(Duration::from_secs(2));
    scheduler.run_due();
    assert_eq!(*seen.lock(), vec!["/outer", "/inner"]);
}

#[test]
fn test_nested_past_bundle_inside_immediate_bundle() {
    let (d, _, scheduler) = manual();
    let seen = recorder(&d, "/*");

    let inner = Bundle::new(TimeTag::new(1, 0), vec![msg("/old").into()]);
    let outer = Bundle::immediate(vec![inner.into(), msg("/now").into()]);
    d.dispatch(Packet::Bundle(outer));

    assert_eq!(*seen.lock(), vec!["/old", "/now"]);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_shutdown_cancels_deferred_bundles() {
    let (d, clock, scheduler) = manual();
    let seen = recorder(&d, "/*");

    let bundle = Bundle::at(start() + Duration::from_secs(2), vec![msg("/a").into()]).unwrap();
    d.dispatch(bundle.into());
    d.shutdown();

    clock.advance(Duration::from_secs(10));
    scheduler.run_due();
    assert!(seen.lock().is_empty());
}

// ============================================================================
// Real timer queue
// ============================================================================

async fn wait_for<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_timer_queue_delivers_future_bundle() {
    let d = Dispatcher::new();
    let seen = recorder(&d, "/tick");

    let due = SystemTime::now() + Duration::from_millis(200);
    let bundle = Bundle::at(due, vec![msg("/tick").into()]).unwrap();
    let summary = d.dispatch(bundle.into());

    assert_eq!(summary.deferred, 1);
    assert!(seen.lock().is_empty());

    let delivered = wait_for(|| !seen.lock().is_empty(), Duration::from_secs(2)).await;
    assert!(delivered);
    assert!(SystemTime::now() >= due - Duration::from_millis(5));
}

#[tokio::test]
async fn test_timer_queue_shutdown() {
    let d = Dispatcher::new();
    let seen = recorder(&d, "/tick");

    let due = SystemTime::now() + Duration::from_millis(100);
    d.dispatch(Bundle::at(due, vec![msg("/tick").into()]).unwrap().into());
    d.shutdown();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(seen.lock().is_empty());
}
