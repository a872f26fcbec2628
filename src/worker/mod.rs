//! The worker process: the fetch/dispatch loop and everything a single delivery goes through.

pub mod callback;
pub mod dispatch;
pub mod lifecycle;
pub mod observer;
pub mod processor;
pub mod retry_limiter;

pub use dispatch::Dispatcher;
pub use lifecycle::Lifecycle;
pub use processor::{IterationHook, LoopControl, LoopState, WorkDispatchLoop};
