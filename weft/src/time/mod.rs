//! Timers.
//!
//! This module provides time-related asynchronous utilities that
//! integrate with the runtime reactor.
//!
//! It includes:
//! - [`sleep`] and [`sleep_until`] for waiting on a deadline,
//! - [`timeout`] for bounding how long a future may take,
//! - [`instrumented`] for measuring how long a future took.
//!
//! Timers are registered with the reactor on first poll and cancelled as
//! soon as the future owning them is dropped.

pub mod error;

mod instrumented;
mod sleep;
mod timeout;

#[doc(inline)]
pub use instrumented::{Instrumented, instrumented};

#[doc(inline)]
pub use sleep::{Sleep, sleep, sleep_until};

#[doc(inline)]
pub use timeout::{Timeout, timeout, timeout_at};
