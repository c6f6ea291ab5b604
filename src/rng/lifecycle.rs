//! One-time lazy initialization, teardown, and the seed-file load/save
//! interaction points: binding entropy backends, resetting pool state on
//! close, and loading/saving the persistent seed file under an advisory
//! lock.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::fcntl::{flock, FlockArg};

use super::constants::POOLSIZE;
use super::error::fatal;
use super::intake;
use super::mixer;
use super::polling::{
    self, Backends, DefaultFastSource, GetrandomSource, HwRngSource, JitterSource, SlowSource,
    UrandomSource,
};
use super::pool::PoolState;
use super::types::{Level, Origin};

/// Idempotent basic setup. In the original design this wires up the mutex
/// and asserts enum ordering; here those are compile-time guarantees, so
/// this just marks the occasion in the log.
pub(crate) fn initialize_basics() {
    tracing::debug!("entropy pool basics initialized");
}

/// Full initialization: binds the slow and fast/hw gatherers if not already
/// bound. Fatal if no slow source can be found.
pub(crate) fn initialize(state: &mut PoolState) {
    initialize_basics();
    if state.backends.is_none() {
        state.backends = Some(probe_backends());
    }
}

fn probe_backends() -> Backends {
    let candidates: Vec<Box<dyn SlowSource>> = vec![
        Box::new(GetrandomSource::default()),
        Box::new(UrandomSource::default()),
        Box::new(JitterSource),
    ];

    let mut chosen: Option<Box<dyn SlowSource>> = None;
    for candidate in candidates {
        let mut ok = false;
        candidate.gather(1, Level::Weak, &mut |_| ok = true);
        if ok {
            tracing::debug!(source = candidate.name(), "bound slow entropy source");
            chosen = Some(candidate);
            break;
        }
    }

    let slow = chosen.unwrap_or_else(|| fatal("no slow entropy source is available"));
    Backends {
        slow,
        fast: Some(Box::new(DefaultFastSource)),
        hw: Some(Box::new(HwRngSource::probe())),
    }
}

/// Releases backend resources and resets the pool to a freshly-allocated
/// state, preserving only the configuration knobs that are process-wide
/// rather than pool content (`secure_mem`, `quick_test`, the registered
/// seed file path).
pub(crate) fn close(state: &mut PoolState) {
    if let Some(backends) = state.backends.take() {
        backends.slow.release();
    }
    let secure_mem = state.secure_mem;
    let quick_test = state.quick_test;
    let seed_file = state.seed_file.take();

    *state = PoolState::new(secure_mem);
    state.quick_test = quick_test;
    state.seed_file = seed_file;
}

/// Registers the seed file path. Re-registration is a programmer error and
/// is treated as fatal, matching the original design.
pub(crate) fn set_seed_file(state: &mut PoolState, path: PathBuf) {
    if state.seed_file.is_some() {
        fatal("seed file path is already registered");
    }
    state.seed_file = Some(path);
}

/// Called from the reader's pre-read state machine when the pool isn't yet
/// filled. Returns whether the load succeeded in filling the pool.
pub(crate) fn load_seed_file_if_unfilled(state: &mut PoolState) -> bool {
    if try_load_seed_file(state) {
        state.pool_filled = true;
        true
    } else {
        false
    }
}

fn try_load_seed_file(state: &mut PoolState) -> bool {
    let Some(path) = state.seed_file.clone() else {
        return false;
    };

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            state.allow_seed_update = true;
            return false;
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to open seed file");
            return false;
        }
    };

    if !acquire_lock(&file, false) {
        tracing::warn!("failed to acquire shared lock on seed file");
        return false;
    }

    let meta = match file.metadata() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "failed to stat seed file");
            return false;
        }
    };

    if !meta.is_file() {
        tracing::warn!("seed file path is not a regular file, ignoring");
        return false;
    }

    if meta.len() == 0 {
        tracing::info!("seed file is empty, will be populated on next save");
        state.allow_seed_update = true;
        return false;
    }

    if meta.len() != POOLSIZE as u64 {
        tracing::warn!(len = meta.len(), "seed file has unexpected size, ignoring");
        return false;
    }

    let mut buf = vec![0u8; POOLSIZE];
    let mut file = file;
    loop {
        match file.read_exact(&mut buf) {
            Ok(()) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read seed file");
                return false;
            }
        }
    }

    intake::add(state, &buf, Origin::Init);

    let pid = nix::unistd::getpid().as_raw();
    intake::add(state, &pid.to_le_bytes(), Origin::Init);
    intake::add(state, &polling::time_and_clock_bytes(), Origin::Init);

    let topup_len = state
        .backends
        .as_ref()
        .map(|b| if b.slow.is_jitter_like() { 128 } else { 32 })
        .unwrap_or(32);

    let mut collected = Vec::with_capacity(topup_len);
    if let Some(backends) = state.backends.as_ref() {
        polling::slow_request(backends, topup_len, Level::Strong, &mut |b| {
            collected.extend_from_slice(b)
        });
        state.stats.slowpolls += 1;
    }
    intake::add(state, &collected, Origin::Init);

    state.allow_seed_update = true;
    true
}

/// Writes the current pool to the seed file iff the pool is filled and
/// updates are allowed. The saved bytes are the word-wise-derived, doubly
/// mixed `key` buffer, not the raw canonical pool.
pub(crate) fn update_seed_file(state: &mut PoolState) {
    if !(state.pool_filled && state.allow_seed_update) {
        return;
    }
    let Some(path) = state.seed_file.clone() else {
        return;
    };

    super::reader::derive_key_snapshot(state);

    if let Err(e) = write_seed_file(&path, &state.key[..POOLSIZE]) {
        tracing::warn!(error = %e, "failed to write seed file");
    }

    use zeroize::Zeroize;
    state.key[..POOLSIZE].zeroize();
}

fn write_seed_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // Deliberately no `.truncate(true)` here: truncating as part of the
    // open would zero the file the instant it's opened, before we hold the
    // exclusive lock (or even know we'll get it) — a concurrent reader
    // holding only an advisory shared lock would see a truncated file with
    // no writer-side lock discipline having been honored at all. Truncate
    // explicitly once the lock is ours instead.
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .mode(0o600)
        .open(path)?;

    if !acquire_lock(&file, true) {
        return Err(std::io::Error::new(
            ErrorKind::WouldBlock,
            "could not acquire exclusive lock on seed file",
        ));
    }

    let mut file = file;
    file.set_len(0)?;
    file.write_all(bytes)
}

/// Advisory whole-file lock with bounded backoff, capped at roughly ten
/// seconds. Never fatal: on failure the caller treats the file as unusable
/// for this attempt.
fn acquire_lock(file: &File, exclusive: bool) -> bool {
    let arg = if exclusive {
        FlockArg::LockExclusiveNonblock
    } else {
        FlockArg::LockSharedNonblock
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut backoff = Duration::from_millis(10);
    loop {
        if flock(file.as_raw_fd(), arg).is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(backoff);
        backoff = (backoff * 2).min(Duration::from_millis(500));
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_seed_file_allows_future_update() {
        let mut state = PoolState::new(false);
        let path = NamedTempFile::new().unwrap().path().to_path_buf();
        // NamedTempFile deletes on drop above; the path is now missing.
        state.seed_file = Some(path);
        assert!(!try_load_seed_file(&mut state));
        assert!(state.allow_seed_update);
    }

    #[test]
    fn wrong_size_seed_file_is_ignored() {
        let mut state = PoolState::new(false);
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        state.seed_file = Some(file.path().to_path_buf());
        assert!(!try_load_seed_file(&mut state));
        assert!(!state.allow_seed_update);
    }
}
