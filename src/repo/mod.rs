// src/repo/mod.rs

//! Per-session repositories. Each owns a local cache of what the user is
//! looking at and is the only writer of that cache.

pub mod comments;
pub mod posts;
pub mod profile;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
