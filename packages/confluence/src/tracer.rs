//! Live-channel accounting, enabled by the `alloc-tracer` cargo feature.
//!
//! Every channel shared state increments a process-wide counter when it is
//! created and decrements it when the last handle drops. With the
//! `alloc-tracer-full` feature the counts are additionally kept per call
//! site of the channel constructor, so a leak can be attributed to the line
//! that allocated it.

use std::panic::Location;
use std::sync::atomic::{AtomicI64, Ordering};

static LIVE: AtomicI64 = AtomicI64::new(0);

#[cfg(feature = "alloc-tracer-full")]
fn sites() -> &'static dashmap::DashMap<&'static Location<'static>, i64> {
    use std::sync::OnceLock;
    static SITES: OnceLock<dashmap::DashMap<&'static Location<'static>, i64>> = OnceLock::new();
    SITES.get_or_init(dashmap::DashMap::new)
}

pub(crate) fn created(site: &'static Location<'static>) {
    LIVE.fetch_add(1, Ordering::Relaxed);
    #[cfg(feature = "alloc-tracer-full")]
    {
        *sites().entry(site).or_insert(0) += 1;
    }
    #[cfg(not(feature = "alloc-tracer-full"))]
    let _ = site;
}

pub(crate) fn dropped(site: &'static Location<'static>) {
    LIVE.fetch_sub(1, Ordering::Relaxed);
    #[cfg(feature = "alloc-tracer-full")]
    {
        *sites().entry(site).or_insert(0) -= 1;
    }
    #[cfg(not(feature = "alloc-tracer-full"))]
    let _ = site;
}

/// Number of channel shared states currently alive in the process.
pub fn live_channel_count() -> i64 {
    LIVE.load(Ordering::Relaxed)
}

/// The `n` constructor call sites with the most live channels, most first.
#[cfg(feature = "alloc-tracer-full")]
pub fn top_call_sites(n: usize) -> Vec<(&'static Location<'static>, i64)> {
    let mut all: Vec<_> = sites()
        .iter()
        .map(|entry| (*entry.key(), *entry.value()))
        .collect();
    all.sort_by(|a, b| b.1.cmp(&a.1));
    all.truncate(n);
    all
}
