/*!
Cancellable progress reporting and main-loop channels.

This crate is the asynchronous substrate of the rendering core. It provides
two small building blocks:

- [`Progress`], an interface through which long-running tasks report their
  progress and notice cooperative cancellation, together with a family of
  adapters for remapping, throttling and splitting progress ranges.
- [`channel`], a one-way, thread-safe submission of closures from a worker
  thread to a consumer that drains them on its own (usually the main) loop.

Neither primitive spins up threads by itself; they only carry work and
progress between threads the caller owns.
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;

mod background_progress;
mod progress;

pub use background_progress::BackgroundProgress;
pub use progress::*;
