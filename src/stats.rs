//! Process-wide request counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Counters shared by every request.
///
/// Constructed once at startup and injected through the application state.
#[derive(Debug)]
pub struct Stats {
    resized: AtomicU64,
    uploaded: AtomicU64,
    deleted: AtomicU64,
    rejected: AtomicU64,
    canceled: AtomicU64,
    in_progress: AtomicU64,
    started: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            resized: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            in_progress: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_resized(&self) {
        self.resized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_uploaded(&self) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_canceled(&self) {
        self.canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter(&self) {
        self.in_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn leave(&self) {
        self.in_progress.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn resized(&self) -> u64 {
        self.resized.load(Ordering::Relaxed)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn canceled(&self) -> u64 {
        self.canceled.load(Ordering::Relaxed)
    }

    pub fn in_progress(&self) -> u64 {
        self.in_progress.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Buffer pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub pooled_buffers: usize,
    pub pooled_bytes: usize,
}

/// JSON body of `/stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub resized: u64,
    pub uploaded: u64,
    pub deleted: u64,
    pub rejected: u64,
    pub canceled: u64,
    pub in_progress: u64,
    pub accept_available: usize,
    pub processing_available: usize,
    pub pool: PoolSnapshot,
    pub uptime_secs: u64,
}
