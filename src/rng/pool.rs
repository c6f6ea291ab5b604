//! Owns the pool's raw buffers, cursors, and bookkeeping flags. This module
//! captures §3's data model; behavior lives in `intake`, `reader`, and
//! `lifecycle`.

use zeroize::Zeroize;

use super::constants::POOL_ALLOC_LEN;
use super::mixer::FailsafeDigest;
use super::polling::Backends;
use super::stats::Stats;

/// A pool buffer (`rnd` or `key`): `POOLSIZE` bytes of reservoir followed by
/// `BLOCKLEN` bytes of mixer scratch space, optionally backed by locked
/// memory so it never swaps.
pub(crate) struct SecureBuffer {
    data: Vec<u8>,
    locked: bool,
}

impl SecureBuffer {
    fn new(secure_mem: bool) -> Self {
        let mut data = vec![0u8; POOL_ALLOC_LEN];
        let locked = secure_mem && lock_memory(&mut data);
        Self { data, locked }
    }
}

impl std::ops::Deref for SecureBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for SecureBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
        if self.locked {
            unlock_memory(&self.data);
        }
    }
}

#[cfg(unix)]
fn lock_memory(data: &mut [u8]) -> bool {
    let rc = unsafe { libc::mlock(data.as_ptr() as *const libc::c_void, data.len()) };
    if rc != 0 {
        tracing::warn!("mlock failed for entropy pool buffer, continuing without page lock");
        false
    } else {
        true
    }
}

#[cfg(unix)]
fn unlock_memory(data: &[u8]) {
    unsafe {
        libc::munlock(data.as_ptr() as *const libc::c_void, data.len());
    }
}

#[cfg(not(unix))]
fn lock_memory(_data: &mut [u8]) -> bool {
    false
}

#[cfg(not(unix))]
fn unlock_memory(_data: &[u8]) {}

/// Process-wide pool state, guarded by a single mutex (see `rng::pool()`).
pub(crate) struct PoolState {
    pub(crate) rnd: SecureBuffer,
    pub(crate) key: SecureBuffer,
    pub(crate) write_pos: usize,
    pub(crate) read_pos: usize,
    pub(crate) pool_filled: bool,
    pub(crate) fill_counter: usize,
    pub(crate) extra_seeded: bool,
    pub(crate) balance: isize,
    pub(crate) just_mixed: bool,
    pub(crate) seed_file: Option<std::path::PathBuf>,
    pub(crate) allow_seed_update: bool,
    pub(crate) secure_mem: bool,
    pub(crate) quick_test: bool,
    pub(crate) failsafe: FailsafeDigest,
    pub(crate) last_pid: Option<i32>,
    pub(crate) stats: Stats,
    pub(crate) backends: Option<Backends>,
    pub(crate) hw_source_failed: bool,
}

impl PoolState {
    pub(crate) fn new(secure_mem: bool) -> Self {
        Self {
            rnd: SecureBuffer::new(secure_mem),
            key: SecureBuffer::new(secure_mem),
            write_pos: 0,
            read_pos: 0,
            pool_filled: false,
            fill_counter: 0,
            extra_seeded: false,
            balance: 0,
            just_mixed: false,
            seed_file: None,
            allow_seed_update: false,
            secure_mem,
            quick_test: false,
            failsafe: FailsafeDigest::default(),
            last_pid: None,
            stats: Stats::default(),
            backends: None,
            hw_source_failed: false,
        }
    }

    /// Floors `balance` at zero; called after every mutation per the
    /// `balance >= 0` invariant.
    pub(crate) fn clamp_balance(&mut self) {
        if self.balance < 0 {
            self.balance = 0;
        }
    }
}
