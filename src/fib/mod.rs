// File: src/fib/mod.rs
//
// The Fib route-synchronization pipeline: snapshots come in through the
// receiver, get coalesced by the debouncer, are diffed against the installed
// table and programmed through the agent client. A scheduler forces periodic
// full syncs. Everything runs on one event loop per Fib instance.

mod context;
mod debounce;
mod events;
mod handle;
mod manager;
mod publisher;
mod receiver;
mod scheduler;

pub use context::FibContext;
pub use debounce::Debouncer;
pub use events::{FibCounters, FibQuery};
pub use handle::FibHandle;
pub use manager::Fib;
pub use publisher::{channel, load_route_file, SnapshotPublisher};
pub use receiver::SnapshotReceiver;
pub use scheduler::SyncScheduler;
