//! Shared small types: trust tags for intake and strength levels for reads.

/// Trust tag accompanying a byte-add; governs whether the bytes may advance
/// the initial-fill counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Init,
    SlowPoll,
    FastPoll,
    ExtraPoll,
    External,
}

impl Origin {
    /// Origins trusted enough to count toward the initial-fill counter.
    /// `FastPoll` bytes never contribute, since an attacker who only
    /// controls timing-derived content shouldn't be able to trip
    /// `pool_filled`.
    pub(crate) fn counts_toward_fill(self) -> bool {
        !matches!(self, Origin::FastPoll)
    }
}

/// Requested output strength.
///
/// `Weak` and `Strong` are identical at this layer; `VeryStrong` triggers
/// additional slow-source seeding the first time it is requested, and a
/// top-up whenever the tracked balance can't cover the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Weak,
    Strong,
    VeryStrong,
}

impl Level {
    /// Masks any bits beyond the low two bits and demotes `VeryStrong` to
    /// `Strong` when `quick_test` is enabled, per §4.E's level policy.
    pub(crate) fn normalize(self, quick_test: bool) -> Level {
        if quick_test && self == Level::VeryStrong {
            Level::Strong
        } else {
            self
        }
    }
}
