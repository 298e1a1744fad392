//! Synchronous broadcast, cancellable subscriptions and cold publishers.
//!
//! Delivery is synchronous: [`Broadcast::send`] returns after every live
//! listener has run, in subscription order. Listeners are invoked with no lock
//! held so they may send, subscribe or cancel re-entrantly. [`Stream`] bridges
//! a publisher into async code for one-shot waits.

mod broadcast;
mod publisher;
mod stream;

pub use broadcast::{Broadcast, Subscription};
pub use publisher::{Publisher, Sink};
pub use stream::{Stream, WaitError};

#[cfg(test)]
mod tests;
