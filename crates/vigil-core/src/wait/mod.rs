//! Bounded waiting for check implementations and status watchers.

pub mod poll;
pub mod timeout;

pub use poll::{call_until_true, wait_for_status, ReportsError, WaitError};
pub use timeout::{DeadlineExceeded, ExecutionTimeout, InflightCall};
