use thiserror::Error;

/// Caller-visible failures from the entropy pool's public surface.
///
/// Per the core's error-tiering design, most conditions that could
/// compromise output quality are treated as fatal (they panic rather than
/// return here) instead of being silently downgraded. This enum only covers
/// the handful of conditions a caller can reasonably be expected to recover
/// from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RngError {
    /// `add_bytes` or `randomize`/`read` was asked to move more than
    /// [`crate::rng::constants::POOLSIZE`] bytes in a single chunk.
    #[error("requested chunk length {0} exceeds the pool size")]
    ChunkTooLarge(usize),

    /// No slow entropy source could be bound at initialization time.
    #[error("no slow entropy source is available on this platform")]
    NoEntropySource,

    /// The seed file path was already registered; re-registration is a
    /// programmer error the original design treats as fatal.
    #[error("a seed file path is already registered")]
    SeedFileAlreadyRegistered,
}

/// Aborts the process for conditions the design treats as unrecoverable:
/// loss of the entropy source, a poisoned pool mutex, or a slow-gatherer
/// backend reporting failure. An RNG that silently degraded instead would be
/// a security hazard, so these conditions are upgraded to a hard stop rather
/// than threaded through `Result`.
#[cold]
#[track_caller]
pub(crate) fn fatal(message: &str) -> ! {
    tracing::error!(target: "rng::fatal", "{message}");
    panic!("entropy pool fatal error: {message}");
}
