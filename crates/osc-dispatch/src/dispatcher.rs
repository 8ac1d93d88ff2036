//! Pattern-routed dispatch
//!
//! A [`Dispatcher`] owns an insertion-ordered list of registrations. Messages
//! are delivered to every handler whose pattern intersects the message address.
//! Bundles whose time tag lies in the future are handed to a [`Schedule`] and
//! delivered once due; each nested bundle re-checks its own time tag when its
//! parent is delivered.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use osc_core::{Bundle, Message, Packet, Pattern};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::scheduler::{Schedule, TimerQueue};

/// Something that consumes decoded OSC messages
pub trait Handler: Send + Sync {
    fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Message) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, message: &Message) -> anyhow::Result<()> {
        self(message)
    }
}

/// Capability to route packets to handlers
pub trait Dispatch {
    /// Deliver a decoded packet
    fn dispatch(&self, packet: Packet) -> DispatchSummary;

    /// Decode raw bytes and deliver the result
    fn dispatch_bytes(&self, bytes: &[u8]) -> Result<DispatchSummary>;
}

/// Outcome of the synchronous part of a dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Handler invocations that returned `Ok`
    pub delivered: usize,
    /// Handler invocations that returned an error or panicked
    pub failed: usize,
    /// Bundles handed to the scheduler
    pub deferred: usize,
}

impl DispatchSummary {
    fn merge(&mut self, other: DispatchSummary) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Catch handler panics and count them as failures
    pub catch_panics: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { catch_panics: true }
    }
}

struct Registration {
    pattern: Option<Pattern>,
    handler: Arc<dyn Handler>,
}

impl Registration {
    fn accepts(&self, address: &Pattern) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => pattern.intersects(address),
        }
    }
}

struct Inner {
    config: DispatcherConfig,
    registrations: RwLock<Vec<Registration>>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Schedule>,
}

/// Routes packets to registered handlers.
///
/// Cloning is cheap; clones share registrations and the scheduler.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher on the system clock with a [`TimerQueue`] spawned
    /// on the current tokio runtime.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(TimerQueue::start()))
    }

    /// Create a dispatcher with an explicit clock and scheduler
    pub fn with_parts(
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Schedule>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registrations: RwLock::new(Vec::new()),
                clock,
                scheduler,
            }),
        }
    }

    /// Register a handler for every address intersecting `pattern`
    pub fn register<F>(&self, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let pattern = Pattern::compile(pattern)?;
        self.push(Some(pattern), Arc::new(handler));
        Ok(())
    }

    /// Register a handler for every message
    pub fn register_any<F>(&self, handler: F)
    where
        F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(None, Arc::new(handler));
    }

    /// Register a shared handler object
    pub fn register_handler(&self, pattern: Option<Pattern>, handler: Arc<dyn Handler>) {
        self.push(pattern, handler);
    }

    fn push(&self, pattern: Option<Pattern>, handler: Arc<dyn Handler>) {
        debug!(
            "Registered handler for {}",
            pattern.as_ref().map(Pattern::as_str).unwrap_or("*any*")
        );
        self.inner
            .registrations
            .write()
            .push(Registration { pattern, handler });
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.inner.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a packet. Due content runs before this returns; bundles in the
    /// future are scheduled.
    pub fn dispatch(&self, packet: Packet) -> DispatchSummary {
        self.inner.dispatch_packet(&self.inner, packet)
    }

    /// Decode `bytes` and deliver the packet.
    ///
    /// Decode failures are logged and returned; nothing is delivered.
    pub fn dispatch_bytes(&self, bytes: &[u8]) -> Result<DispatchSummary> {
        match osc_core::decode(bytes) {
            Ok(packet) => Ok(self.dispatch(packet)),
            Err(e) => {
                warn!("Dropping undecodable packet ({} bytes): {}", bytes.len(), e);
                Err(e.into())
            }
        }
    }

    /// Cancel every deferred bundle that has not been delivered yet
    pub fn shutdown(&self) {
        debug!("Dispatcher shutting down");
        self.inner.scheduler.cancel_all();
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&self, packet: Packet) -> DispatchSummary {
        Dispatcher::dispatch(self, packet)
    }

    fn dispatch_bytes(&self, bytes: &[u8]) -> Result<DispatchSummary> {
        Dispatcher::dispatch_bytes(self, bytes)
    }
}

impl Inner {
    fn dispatch_packet(&self, this: &Arc<Inner>, packet: Packet) -> DispatchSummary {
        match packet {
            Packet::Message(msg) => self.deliver(&msg),
            Packet::Bundle(bundle) => self.dispatch_bundle(this, bundle),
        }
    }

    fn dispatch_bundle(&self, this: &Arc<Inner>, bundle: Bundle) -> DispatchSummary {
        let delay = self.delay_until(&bundle);
        if delay.is_zero() {
            let mut summary = DispatchSummary::default();
            for child in bundle.contents {
                summary.merge(self.dispatch_packet(this, child));
            }
            return summary;
        }

        debug!(
            "Deferring bundle of {} elements by {:?} (time tag {})",
            bundle.len(),
            delay,
            bundle.timetag
        );

        let weak: Weak<Inner> = Arc::downgrade(this);
        let job = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                for child in bundle.contents {
                    inner.dispatch_packet(&inner, child);
                }
            }
        });

        match self.scheduler.after(delay, job) {
            Ok(()) => DispatchSummary {
                deferred: 1,
                ..Default::default()
            },
            Err(e) => {
                warn!("Failed to schedule bundle: {}", e);
                DispatchSummary::default()
            }
        }
    }

    /// Zero for immediate or past time tags
    fn delay_until(&self, bundle: &Bundle) -> Duration {
        if bundle.timetag.is_immediate() {
            return Duration::ZERO;
        }
        bundle
            .timetag
            .to_system_time()
            .duration_since(self.clock.now())
            .unwrap_or(Duration::ZERO)
    }

    fn deliver(&self, msg: &Message) -> DispatchSummary {
        let address = Pattern::compile(msg.address())
            .unwrap_or_else(|_| Pattern::literal(msg.address()));

        // Handlers run outside the lock so they may register more handlers
        let handlers: Vec<Arc<dyn Handler>> = self
            .registrations
            .read()
            .iter()
            .filter(|reg| reg.accepts(&address))
            .map(|reg| Arc::clone(&reg.handler))
            .collect();

        let mut summary = DispatchSummary::default();
        for handler in handlers {
            if self.invoke(handler.as_ref(), msg) {
                summary.delivered += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    fn invoke(&self, handler: &dyn Handler, msg: &Message) -> bool {
        let result = if self.config.catch_panics {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(msg))) {
                Ok(result) => result,
                Err(_) => {
                    warn!("Handler panicked on {}", msg.address());
                    return false;
                }
            }
        } else {
            handler.handle(msg)
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Handler failed on {}: {:#}", msg.address(), e);
                false
            }
        }
    }
}
