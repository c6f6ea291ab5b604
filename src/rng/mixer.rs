//! The overlapping SHA-1 cascade that stirs a pool buffer in place.
//!
//! This is deliberately not "hash the pool and call it a day": each 20-byte
//! output window is the compression of a 64-byte *input* window that spans
//! it by 44 bytes of context on either side, so a single-bit change in the
//! pool propagates across the whole buffer within one mix.

use generic_array::{typenum::U64, GenericArray};
use sha1::{compress, Digest, Sha1};

use super::constants::{BLOCKLEN, DIGESTLEN, POOLBLOCKS, POOLSIZE};

type Block = GenericArray<u8, U64>;

const H0: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

fn sha1_compress_block(state: &mut [u32; 5], block: &[u8; BLOCKLEN]) {
    let block: Block = GenericArray::clone_from_slice(block);
    compress(state, std::slice::from_ref(&block));
}

fn state_to_bytes(state: &[u32; 5]) -> [u8; DIGESTLEN] {
    let mut out = [0u8; DIGESTLEN];
    for (word, chunk) in state.iter().zip(out.chunks_exact_mut(4)) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// A snapshot digest of the canonical pool, XORed into the head of the pool
/// at the start of its next mix. Defends against an implementation bug in
/// the mixer producing a fixed point: the pool is always combined with a
/// strong digest of its own prior state.
#[derive(Default, Clone)]
pub(crate) struct FailsafeDigest {
    digest: [u8; DIGESTLEN],
    valid: bool,
}

impl FailsafeDigest {
    pub(crate) fn current(&self) -> Option<&[u8; DIGESTLEN]> {
        self.valid.then_some(&self.digest)
    }

    fn snapshot(&mut self, pool: &[u8]) {
        debug_assert_eq!(pool.len(), POOLSIZE);
        let digest = Sha1::digest(pool);
        self.digest.copy_from_slice(&digest);
        self.valid = true;
    }

    fn reset(&mut self) {
        self.digest = [0u8; DIGESTLEN];
        self.valid = false;
    }
}

/// Copies the 64-byte mixing window starting at `p`, wrapping around to the
/// front of the pool when the window would run past `POOLSIZE`.
fn load_window(scratch: &mut [u8; BLOCKLEN], pool: &[u8], p: usize) {
    if p + BLOCKLEN <= POOLSIZE {
        scratch.copy_from_slice(&pool[p..p + BLOCKLEN]);
    } else {
        let head = POOLSIZE - p;
        scratch[..head].copy_from_slice(&pool[p..POOLSIZE]);
        scratch[head..].copy_from_slice(&pool[..BLOCKLEN - head]);
    }
}

/// Mixes `buf`, a `POOLSIZE + BLOCKLEN`-byte region whose first `POOLSIZE`
/// bytes are the pool and whose last `BLOCKLEN` bytes are scratch space for
/// this function.
///
/// When `canonical` is true (mixing the `rnd` pool, never `key`) the
/// failsafe digest is XORed in before the cascade and refreshed afterward.
pub(crate) fn mix(buf: &mut [u8], canonical: bool, failsafe: &mut FailsafeDigest) {
    debug_assert_eq!(buf.len(), POOLSIZE + BLOCKLEN);
    let (pool, scratch_region) = buf.split_at_mut(POOLSIZE);
    let mut scratch = [0u8; BLOCKLEN];

    let mut state = H0;

    // Step 1: wrap-join. The last 20 bytes and first 44 bytes of the pool
    // are joined so that the seam does not go under-mixed.
    scratch[..DIGESTLEN].copy_from_slice(&pool[POOLSIZE - DIGESTLEN..POOLSIZE]);
    scratch[DIGESTLEN..].copy_from_slice(&pool[..BLOCKLEN - DIGESTLEN]);
    sha1_compress_block(&mut state, &scratch);
    pool[..DIGESTLEN].copy_from_slice(&state_to_bytes(&state));

    // Step 2: failsafe injection, canonical pool only.
    if canonical {
        if let Some(digest) = failsafe.current() {
            for (b, d) in pool[..DIGESTLEN].iter_mut().zip(digest.iter()) {
                *b ^= *d;
            }
        }
    }

    // Step 3: 30 overlapping windows advancing the write cursor by
    // DIGESTLEN each time, continuing the same SHA-1 context.
    let mut p = 0usize;
    for _ in 0..POOLBLOCKS {
        load_window(&mut scratch, pool, p);
        sha1_compress_block(&mut state, &scratch);
        p = (p + DIGESTLEN) % POOLSIZE;
        let digest = state_to_bytes(&state);
        pool[p..p + DIGESTLEN].copy_from_slice(&digest);
    }

    // Step 4: failsafe snapshot of the freshly mixed canonical pool.
    if canonical {
        failsafe.snapshot(pool);
    }

    // Step 5: burn the scratch region the compression touched.
    scratch_region.fill(0);
    scratch.fill(0);
}

/// Clears the failsafe digest, used when the pool itself is reset on close.
pub(crate) fn reset_failsafe(failsafe: &mut FailsafeDigest) {
    failsafe.reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_pool(seed: u8) -> Vec<u8> {
        let mut buf = vec![0u8; POOLSIZE + BLOCKLEN];
        for (i, b) in buf[..POOLSIZE].iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        let mut failsafe = FailsafeDigest::default();
        mix(&mut buf, true, &mut failsafe);
        buf
    }

    #[test]
    fn mixer_is_deterministic() {
        let a = mixed_pool(7);
        let b = mixed_pool(7);
        assert_eq!(a, b);
    }

    #[test]
    fn mixer_scratch_is_burned() {
        let out = mixed_pool(42);
        assert!(out[POOLSIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn single_bit_flip_causes_avalanche() {
        let mut base = vec![0u8; POOLSIZE + BLOCKLEN];
        for (i, b) in base[..POOLSIZE].iter_mut().enumerate() {
            *b = (i * 37) as u8;
        }
        let mut flipped = base.clone();
        flipped[123] ^= 0x01;

        let mut fs_a = FailsafeDigest::default();
        let mut fs_b = FailsafeDigest::default();
        mix(&mut base, true, &mut fs_a);
        mix(&mut flipped, true, &mut fs_b);

        let differing = base[..POOLSIZE]
            .iter()
            .zip(flipped[..POOLSIZE].iter())
            .filter(|(a, b)| a != b)
            .count();

        assert!(
            differing * 2 >= POOLSIZE,
            "expected avalanche across at least half the pool, got {differing}/{POOLSIZE}"
        );
    }

    #[test]
    fn failsafe_digest_affects_canonical_mix_only() {
        let mut canonical = vec![5u8; POOLSIZE + BLOCKLEN];
        let mut scratch_copy = canonical.clone();

        let mut failsafe = FailsafeDigest::default();
        mix(&mut canonical, true, &mut failsafe);
        assert!(failsafe.current().is_some());

        // A second mix with a stale (zeroed) failsafe on a non-canonical
        // buffer must not consult or mutate the failsafe digest.
        let mut unused_failsafe = FailsafeDigest::default();
        mix(&mut scratch_copy, false, &mut unused_failsafe);
        assert!(unused_failsafe.current().is_none());
    }

    proptest::proptest! {
        // §8: "For random 600-byte inputs, flipping a single bit causes
        // ≥ 50% of the 600 output bytes to differ after one full mix."
        #[test]
        fn avalanche_holds_for_arbitrary_pools(
            seed_bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), POOLSIZE),
            flip_pos in 0..POOLSIZE,
            flip_bit in 0u32..8,
        ) {
            let mut base = vec![0u8; POOLSIZE + BLOCKLEN];
            base[..POOLSIZE].copy_from_slice(&seed_bytes);
            let mut flipped = base.clone();
            flipped[flip_pos] ^= 1 << flip_bit;

            let mut fs_a = FailsafeDigest::default();
            let mut fs_b = FailsafeDigest::default();
            mix(&mut base, true, &mut fs_a);
            mix(&mut flipped, true, &mut fs_b);

            let differing = base[..POOLSIZE]
                .iter()
                .zip(flipped[..POOLSIZE].iter())
                .filter(|(a, b)| a != b)
                .count();

            proptest::prop_assert!(differing * 2 >= POOLSIZE);
        }

        // Determinism must hold for arbitrary inputs, not just the fixed
        // patterns above.
        #[test]
        fn mix_is_deterministic_for_arbitrary_pools(
            seed_bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), POOLSIZE),
        ) {
            let mut a = vec![0u8; POOLSIZE + BLOCKLEN];
            a[..POOLSIZE].copy_from_slice(&seed_bytes);
            let mut b = a.clone();

            let mut fs_a = FailsafeDigest::default();
            let mut fs_b = FailsafeDigest::default();
            mix(&mut a, true, &mut fs_a);
            mix(&mut b, true, &mut fs_b);

            proptest::prop_assert_eq!(a, b);
        }
    }
}
