//! A continuously-seeded, cryptographically strong entropy pool modeled on
//! Peter Gutmann's `cryptlib` randomness subsystem.
//!
//! A single process-wide pool (see [`rng`]) is stirred by an overlapping
//! SHA-1 cascade and kept topped up by fast (cheap, untrusted) and slow
//! (blocking, trusted) entropy sources. Output is never read directly from
//! the canonical pool; it is derived through a scratch copy so that an
//! attacker who sees output bytes cannot trivially reconstruct pool state.
//!
//! ```
//! use entropy_pool::rng::{self, Level};
//!
//! let mut buf = [0u8; 32];
//! rng::randomize(&mut buf, Level::Strong);
//! ```

pub mod rng;

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`,
/// falling back to `info`. Optional: callers embedding this crate in a
/// larger process are expected to install their own subscriber instead.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
