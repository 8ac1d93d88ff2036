//! OSC Dispatch
//!
//! Routes decoded OSC packets to handlers registered against address patterns,
//! deferring bundles until their time tag is due.
//!
//! ```no_run
//! use osc_dispatch::Dispatcher;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new();
//! dispatcher.register("/synth/*/freq", |msg| {
//!     println!("{}", msg);
//!     Ok(())
//! })?;
//!
//! let bytes = b"/synth/1/freq\0\0\0,f\0\0\x43\xdc\0\0";
//! dispatcher.dispatch_bytes(bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{Dispatch, DispatchSummary, Dispatcher, DispatcherConfig, Handler};
pub use error::{DispatchError, Result};
pub use scheduler::{Job, Schedule, TimerQueue};
