// Hot-post ranking: scoring, the ranked cache protocol, and async recompute via the queue.
// Everything here degrades instead of failing; ranking is a rebuildable derived view.

pub mod clock;
pub mod detail;
pub mod dispatcher;
pub mod handlers;
pub mod manager;
pub mod queue;
pub mod repository;
pub mod scorer;
pub mod store;
pub mod worker;

#[cfg(test)]
pub mod testing;
