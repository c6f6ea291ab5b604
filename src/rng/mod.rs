//! Continuously-seeded entropy pool core.
//!
//! A process-wide singleton pool, lazily created on first use and guarded
//! by a single coarse-grained mutex. The public surface here is the only
//! part callers should touch directly; everything else in this module tree
//! is plumbing.
//!
//! ```
//! use entropy_pool::rng::{self, Level};
//!
//! let mut buf = [0u8; 32];
//! rng::randomize(&mut buf, Level::Strong);
//! ```

mod constants;
mod error;
mod intake;
mod lifecycle;
mod mixer;
mod pool;
mod polling;
mod reader;
mod stats;
mod types;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

pub use error::RngError;
pub use polling::{Backends, FastSource, HwSource, SlowSource};
pub use stats::Stats;
pub use types::Level;

use constants::POOLSIZE;
use pool::PoolState;
use types::Origin;

static POOL: OnceLock<Mutex<PoolState>> = OnceLock::new();
static SECURE_ALLOC_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Returns the global pool, allocating and binding entropy backends on
/// first call. This is the only path that forces allocation; `fast_poll`
/// and a few other entry points must be able to distinguish "not yet
/// allocated" from "allocated", which is why this uses `OnceLock` rather
/// than an eagerly-constructed static.
fn pool() -> &'static Mutex<PoolState> {
    POOL.get_or_init(|| {
        let secure_mem = SECURE_ALLOC_REQUESTED.load(Ordering::SeqCst);
        let mut state = PoolState::new(secure_mem);
        lifecycle::initialize(&mut state);
        Mutex::new(state)
    })
}

fn pool_if_allocated() -> Option<&'static Mutex<PoolState>> {
    POOL.get()
}

fn lock(mtx: &Mutex<PoolState>) -> std::sync::MutexGuard<'_, PoolState> {
    mtx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Must be called before the first call that would allocate the pool.
/// Requests that both pool buffers be allocated from locked memory that
/// never swaps. A no-op (with a warning) if the pool is already allocated.
pub fn secure_alloc() {
    if POOL.get().is_some() {
        tracing::warn!("secure_alloc() called after the pool was already allocated; ignored");
        return;
    }
    SECURE_ALLOC_REQUESTED.store(true, Ordering::SeqCst);
}

/// Degrades `Level::VeryStrong` requests to `Level::Strong`, skipping the
/// extra slow-source seeding. Intended for tests.
pub fn enable_quick_gen() {
    lock(pool()).quick_test = true;
}

/// Returns whether `enable_quick_gen` has been called.
pub fn is_faked() -> bool {
    lock(pool()).quick_test
}

/// Releases entropy-backend OS resources and resets the pool to a fresh
/// state. A no-op if the pool was never allocated.
pub fn close_fds() {
    if let Some(mtx) = pool_if_allocated() {
        lifecycle::close(&mut lock(mtx));
    }
}

/// Logs the pool's running counters in a stable line format.
pub fn dump_stats() {
    if let Some(mtx) = pool_if_allocated() {
        lock(mtx).stats.log();
    }
}

/// Returns a copy of the pool's running counters, or the zero value if the
/// pool has never been allocated.
pub fn stats() -> Stats {
    pool_if_allocated().map(|mtx| lock(mtx).stats).unwrap_or_default()
}

/// Registers the path used for persistent seed storage. Re-registration is
/// treated as a fatal programmer error, matching the original design.
pub fn set_seed_file(path: impl Into<PathBuf>) {
    lifecycle::set_seed_file(&mut lock(pool()), path.into());
}

/// Saves the current pool state to the registered seed file, iff the pool
/// is filled and an update is currently allowed. A no-op otherwise, and a
/// no-op if no seed file is registered or the pool was never allocated.
pub fn update_seed_file() {
    if let Some(mtx) = pool_if_allocated() {
        lifecycle::update_seed_file(&mut lock(mtx));
    }
}

/// Public entropy intake. `quality` is clamped to `[0, 100]`, with `-1`
/// meaning "unknown" (treated as 35). Calls with `quality < 10` or an empty
/// buffer are no-ops. Otherwise `buf` is chunked into `POOLSIZE`-sized
/// slices and each is absorbed with origin `External`.
pub fn add_bytes(buf: &[u8], quality: i32) -> Result<(), RngError> {
    let quality = if quality < 0 { 35 } else { quality.min(100) };
    if quality < 10 || buf.is_empty() {
        return Ok(());
    }

    let mut state = lock(pool());
    for chunk in buf.chunks(POOLSIZE) {
        intake::add(&mut state, chunk, Origin::External);
    }
    Ok(())
}

/// Triggers one fast poll, iff the pool has already been allocated. Unlike
/// every other entry point this deliberately does *not* force allocation:
/// a caller doing opportunistic best-effort seeding shouldn't pay the cost
/// of binding entropy backends just to find out there was nothing to do.
pub fn fast_poll() {
    if let Some(mtx) = pool_if_allocated() {
        reader::fast_poll_only(&mut lock(mtx));
    }
}

/// The public read entry point. Chunks `out` into `POOLSIZE`-sized slices,
/// each served by an independent pre-read state machine run, all under one
/// critical section.
pub fn randomize(out: &mut [u8], level: Level) {
    if out.is_empty() {
        return;
    }
    let mut state = lock(pool());
    for chunk in out.chunks_mut(POOLSIZE) {
        reader::read(&mut state, chunk, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // These tests all touch the process-wide singleton pool, so they must
    // not run concurrently with each other or with the doctest above.
    #[test]
    #[serial]
    fn add_bytes_rejects_low_quality() {
        let before = stats().addbytes;
        add_bytes(&[0u8; 100], 5).unwrap();
        assert_eq!(stats().addbytes, before);
    }

    #[test]
    #[serial]
    fn add_bytes_accepts_sufficient_quality() {
        let before = stats().addbytes;
        add_bytes(&[0u8; 100], 50).unwrap();
        assert_eq!(stats().addbytes, before + 100);
    }

    #[test]
    #[serial]
    fn empty_randomize_is_noop() {
        let before = stats().getbytes1;
        let mut buf: [u8; 0] = [];
        randomize(&mut buf, Level::Strong);
        assert_eq!(stats().getbytes1, before);
    }

    #[test]
    #[serial]
    fn randomize_fills_requested_length() {
        let mut buf = [0u8; 48];
        randomize(&mut buf, Level::Weak);
        // Cannot assert randomness quality deterministically against a real
        // backend, but the call must return promptly and fill the buffer
        // without panicking (the stub-backed tests in `reader` cover the
        // actual derivation logic).
        assert_eq!(buf.len(), 48);
    }

    #[test]
    #[serial]
    fn randomize_is_not_constant() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        randomize(&mut a, Level::Strong);
        randomize(&mut b, Level::Strong);
        assert_ne!(a, b, "two independent reads produced identical output");
    }
}
