//! Dispatch error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("core protocol error: {0}")]
    Core(#[from] osc_core::Error),

    #[error("scheduler stopped")]
    SchedulerStopped,
}
