//! `add(bytes, origin)`: XORs bytes into the pool at the write cursor,
//! triggering a mix whenever the cursor wraps.
//!
//! XOR-into-cursor is associative and commutative over the pool state, so
//! intake is a monoid: the order adders run in doesn't matter semantically,
//! only each one's trust tag does. That's what lets fast polls and slow
//! polls interleave freely without a protocol between them.

use super::constants::POOLSIZE;
use super::mixer;
use super::pool::PoolState;
use super::types::Origin;

/// Absorbs `bytes` into the pool under origin `origin`. Requires the pool
/// mutex to already be held by the caller.
pub(crate) fn add(state: &mut PoolState, bytes: &[u8], origin: Origin) {
    state.stats.addbytes += bytes.len() as u64;
    state.stats.naddbytes += 1;

    let mut idx = 0;
    while idx < bytes.len() {
        // Any byte about to be XORed in makes the pool dirty relative to
        // its last mix.
        state.just_mixed = false;

        let room = POOLSIZE - state.write_pos;
        let take = room.min(bytes.len() - idx);
        for (slot, &b) in state.rnd[state.write_pos..state.write_pos + take]
            .iter_mut()
            .zip(&bytes[idx..idx + take])
        {
            *slot ^= b;
        }
        let bytes_this_wrap = take;
        state.write_pos += take;
        idx += take;

        if state.write_pos == POOLSIZE {
            if !state.pool_filled && origin.counts_toward_fill() {
                state.fill_counter += bytes_this_wrap;
                if state.fill_counter >= POOLSIZE {
                    state.pool_filled = true;
                }
            }
            state.write_pos = 0;
            mixer::mix(&mut state.rnd, true, &mut state.failsafe);
            state.stats.mixrnd += 1;
            state.just_mixed = idx == bytes.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> PoolState {
        PoolState::new(false)
    }

    #[test]
    fn fastpoll_never_advances_fill_counter() {
        let mut state = fresh_state();
        let chunk = vec![0xAAu8; POOLSIZE];
        add(&mut state, &chunk, Origin::FastPoll);
        assert_eq!(state.fill_counter, 0);
        assert!(!state.pool_filled);
    }

    #[test]
    fn trusted_origin_fills_pool_after_one_wrap() {
        let mut state = fresh_state();
        let chunk = vec![0x5Au8; POOLSIZE];
        add(&mut state, &chunk, Origin::Init);
        assert_eq!(state.fill_counter, POOLSIZE);
        assert!(state.pool_filled);
        assert_eq!(state.stats.mixrnd, 1);
        assert!(state.just_mixed);
    }

    #[test]
    fn xor_monoid_property_without_intervening_mix() {
        // add(B); add(C) without crossing a wrap boundary commutes with
        // add(B xor C) byte-for-byte.
        let mut a = fresh_state();
        let mut b = fresh_state();

        let half = POOLSIZE / 2;
        let chunk1 = vec![0x11u8; half];
        let chunk2 = vec![0x22u8; half];
        let combined: Vec<u8> = chunk1.iter().zip(&chunk2).map(|(x, y)| x ^ y).collect();

        add(&mut a, &chunk1, Origin::External);
        add(&mut a, &chunk2, Origin::External);
        add(&mut b, &combined, Origin::External);

        assert_eq!(&a.rnd[..POOLSIZE], &b.rnd[..POOLSIZE]);
    }

    #[test]
    fn partial_bytes_after_wrap_clear_just_mixed() {
        let mut state = fresh_state();
        let mut chunk = vec![0x33u8; POOLSIZE + 10];
        chunk[POOLSIZE..].copy_from_slice(&[0x44u8; 10]);
        add(&mut state, &chunk, Origin::Init);
        assert!(!state.just_mixed);
        assert_eq!(state.stats.mixrnd, 1);
    }
}
