//! Background Tasks Module
//!
//! # Tasks
//! - TTL Cleanup: Removes expired entries from a memory store at a fixed interval

mod cleanup;

pub(crate) use cleanup::spawn_cleanup_task;
