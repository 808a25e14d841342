//! The three synchronized widgets.
//!
//! DESIGN
//! ======
//! A widget handle is its mount point: constructing it starts polling,
//! dropping it stops polling and closes its liveness guard. Each widget
//! keeps its state in an `Arc`ed inner value shared with its poll ticks and
//! publishes a view through a `watch` channel.

pub mod chat;
pub mod likes;
pub mod notifications;

/// Result of a user action that may be refused locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran and its effect is visible.
    Applied,
    /// The action was ignored, e.g. another one was still in flight.
    Ignored,
}
