//! Index lifecycle: locking, placement, state and orchestration

pub mod events;
pub mod failure;
pub mod manager;
pub mod paths;
pub mod rwlock;
pub mod state;
