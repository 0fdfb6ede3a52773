//! Background Tasks Module
//!
//! Contains background tasks that run periodically while caches are live.
//!
//! # Tasks
//! - Expiry: Removes expired entries at configured intervals

mod expiry;

pub use expiry::spawn_expiry_task;
