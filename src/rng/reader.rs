//! `read(out, len, level)`: the pre-read seeding state machine (fork check,
//! seed-file load, extra/top-up seeding, fill loop, fast poll, pid stir,
//! guaranteed mix) followed by the scratch-copy double-mix read-out
//! derivation.
//!
//! Emitting bytes straight out of `rnd` would leak pool state to anyone
//! watching the output stream. Instead a derivative `key = rnd + ADD_VALUE`
//! (word-wise) is mixed independently and *that* is what gets emitted, so
//! recovering `rnd` from observed output isn't a matter of undoing one XOR.

use zeroize::Zeroize;

use super::constants::{ADD_VALUE, POOLSIZE};
use super::error::fatal;
use super::intake;
use super::mixer;
use super::pool::PoolState;
use super::polling::{self, Backends};
use super::types::{Level, Origin};

#[cfg(test)]
thread_local! {
    // Lets tests drive deterministic fork scenarios (§8 "Fork") without an
    // actual fork: a queued sequence of pid values is drained one-per-call,
    // holding on the last entry once exhausted.
    static PID_STUB: std::cell::RefCell<Option<std::collections::VecDeque<i32>>> =
        const { std::cell::RefCell::new(None) };
}

#[cfg(test)]
pub(crate) fn stub_pid_sequence(seq: Vec<i32>) {
    PID_STUB.with(|cell| *cell.borrow_mut() = Some(seq.into()));
}

fn current_pid() -> i32 {
    #[cfg(test)]
    {
        let stubbed = PID_STUB.with(|cell| {
            let mut stub = cell.borrow_mut();
            match stub.as_mut() {
                Some(seq) if seq.len() > 1 => seq.pop_front(),
                Some(seq) => seq.front().copied(),
                None => None,
            }
        });
        if let Some(pid) = stubbed {
            return pid;
        }
    }
    nix::unistd::getpid().as_raw()
}

/// Fills `out` (at most `POOLSIZE` bytes) with output at the requested
/// strength. Requires the pool mutex; the caller is responsible for
/// chunking longer requests into independent calls.
pub(crate) fn read(state: &mut PoolState, out: &mut [u8], level: Level) {
    if out.len() > POOLSIZE {
        fatal("read() requested more bytes than the pool holds");
    }
    if out.is_empty() {
        return;
    }

    let level = level.normalize(state.quick_test);
    state.stats.getbytes1 += 1;

    loop {
        let pid_now = current_pid();
        check_fork(state, pid_now);

        if !state.pool_filled {
            super::lifecycle::load_seed_file_if_unfilled(state);
        }

        if level == Level::VeryStrong && !state.extra_seeded {
            let needed = out.len().max(16);
            request_extra(state, needed);
            state.extra_seeded = true;
        }

        if level == Level::VeryStrong && state.balance < out.len() as isize {
            state.clamp_balance();
            let need = ((out.len() as isize) - state.balance).max(0) as usize;
            request_extra(state, need.min(POOLSIZE));
        }

        while !state.pool_filled {
            run_slow_poll(state);
        }

        run_fast_poll(state);

        let pid = state.last_pid.expect("set by check_fork above");
        intake::add(state, &pid.to_le_bytes(), Origin::Init);

        if !state.just_mixed {
            mixer::mix(&mut state.rnd, true, &mut state.failsafe);
            state.stats.mixrnd += 1;
            state.just_mixed = true;
        }

        derive_and_emit(state, out);
        state.stats.getbytes2 += 1;

        let pid_after = current_pid();
        if pid_after != pid_now {
            // The read happened across a fork: the bytes just emitted may
            // equal what the other process will also emit, so they're
            // discarded and the whole state machine restarts.
            intake::add(state, &pid_after.to_le_bytes(), Origin::Init);
            state.last_pid = Some(pid_after);
            continue;
        }

        break;
    }
}

fn check_fork(state: &mut PoolState, pid_now: i32) {
    match state.last_pid {
        None => state.last_pid = Some(pid_now),
        Some(last) if last != pid_now => {
            intake::add(state, &pid_now.to_le_bytes(), Origin::Init);
            state.last_pid = Some(pid_now);
        }
        _ => {}
    }
}

fn backends(state: &PoolState) -> &Backends {
    state
        .backends
        .as_ref()
        .expect("pool read before initialize()")
}

fn request_extra(state: &mut PoolState, needed: usize) {
    let mut collected = Vec::with_capacity(needed);
    polling::slow_request(backends(state), needed, Level::VeryStrong, &mut |b| {
        collected.extend_from_slice(b)
    });
    state.stats.slowpolls += 1;
    intake::add(state, &collected, Origin::ExtraPoll);
    state.balance += needed as isize;
    state.clamp_balance();
}

fn run_slow_poll(state: &mut PoolState) {
    let mut collected = Vec::new();
    polling::slow_poll(backends(state), &mut |b| collected.extend_from_slice(b));
    state.stats.slowpolls += 1;
    intake::add(state, &collected, Origin::SlowPoll);
}

fn run_fast_poll(state: &mut PoolState) {
    let mut collected = Vec::new();
    polling::fast_poll(backends(state), &mut |b| collected.extend_from_slice(b));
    state.stats.fastpolls += 1;
    intake::add(state, &collected, Origin::FastPoll);
}

/// Exposed for the public `fast_poll()` entry point, which may be called
/// independently of a full read.
pub(crate) fn fast_poll_only(state: &mut PoolState) {
    run_fast_poll(state);
}

/// Steps 9-10 of §4.E: derive `key = rnd + ADD_VALUE` word-wise, then mix
/// both `rnd` and `key` independently. Shared between the read path (which
/// goes on to emit and zero `key`) and `update_seed_file` (which saves the
/// derived `key` without emitting anything to a caller).
pub(crate) fn derive_key_snapshot(state: &mut PoolState) {
    const WORD: usize = std::mem::size_of::<u64>();
    debug_assert_eq!(POOLSIZE % WORD, 0);

    for i in (0..POOLSIZE).step_by(WORD) {
        let word = u64::from_ne_bytes(state.rnd[i..i + WORD].try_into().unwrap());
        let added = word.wrapping_add(ADD_VALUE);
        state.key[i..i + WORD].copy_from_slice(&added.to_ne_bytes());
    }

    mixer::mix(&mut state.rnd, true, &mut state.failsafe);
    state.stats.mixrnd += 1;

    // The key buffer is never the canonical pool, so its failsafe handling
    // is a no-op; we still need a digest slot to satisfy the signature.
    let mut unused_failsafe = mixer::FailsafeDigest::default();
    mixer::mix(&mut state.key, false, &mut unused_failsafe);
    state.stats.mixkey += 1;
}

/// Steps 9-12 of §4.E: derive `key` from `rnd`, mix both, emit round-robin
/// bytes from `key`, then zero it.
fn derive_and_emit(state: &mut PoolState, out: &mut [u8]) {
    derive_key_snapshot(state);

    for slot in out.iter_mut() {
        *slot = state.key[state.read_pos];
        state.read_pos = (state.read_pos + 1) % POOLSIZE;
        state.balance -= 1;
    }
    state.clamp_balance();

    state.key[..POOLSIZE].zeroize();
}
