//! Tunable constants for the entropy pool core.
//!
//! Mirrors the sizing used by Peter Gutmann's `cryptlib` randomness pool:
//! a 600-byte reservoir stirred in 20-byte steps by a 64-byte SHA-1 window.

/// Length of one SHA-1 compression block.
pub const BLOCKLEN: usize = 64;

/// Length of a SHA-1 digest.
pub const DIGESTLEN: usize = 20;

/// Number of overlapping mixing windows applied per full mix (excludes the
/// wrap-join step).
pub const POOLBLOCKS: usize = 30;

/// Size of the entropy reservoir itself, not counting mixer scratch space.
pub const POOLSIZE: usize = 600;

/// Size of the scratch region appended after the pool for mixer working space.
pub const SCRATCH_LEN: usize = BLOCKLEN;

/// Total backing allocation for one pool buffer (`rnd` or `key`).
pub const POOL_ALLOC_LEN: usize = POOLSIZE + SCRATCH_LEN;

/// Constant XORed/added into the pool during read-out derivation, word-wise.
///
/// We settled on the 64-bit width unconditionally rather than replicating the
/// host-word-size-dependent behaviour of the original C implementation; see
/// `DESIGN.md` for the rationale.
pub const ADD_VALUE: u64 = 0xA5A5_A5A5_A5A5_A5A5;

/// Bytes requested from the slow source per ordinary slow poll.
pub const SLOWPOLL_BYTES: usize = POOLSIZE / 5;

// The wrap-join plus 30 overlapping windows must account for exactly the
// pool size with no leftover or overrun.
const _: () = assert!(POOLBLOCKS * DIGESTLEN == POOLSIZE);
