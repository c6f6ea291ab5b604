//! Entropy source backends and the fast/slow polling routines that drive
//! bytes from them into the pool.
//!
//! The backends themselves are explicitly out of scope for the core's
//! correctness contract — they are ordinary trait objects bound once at
//! [`super::initialize`] and never swapped afterward. What matters here is
//! only the *calling discipline*: slow polls are blocking and trusted, fast
//! polls are cheap and untrusted.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::constants::SLOWPOLL_BYTES;
use super::Level;

/// A blocking, trusted entropy source. Required at initialization time —
/// if none is available the core is fatal on any call that demands
/// entropy.
pub trait SlowSource: Send + Sync {
    /// Gathers `length` bytes at the requested `level`, invoking `sink`
    /// one or more times with the total amounting to `length` bytes.
    /// Returning `false` is treated as a fatal backend failure.
    fn gather(&self, length: usize, level: Level, sink: &mut dyn FnMut(&[u8])) -> bool;

    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Best-effort release of OS resources. Called from `close`.
    fn release(&self) {}

    /// Whether this source behaves like a jitter RNG, which affects how
    /// many bytes a seed-file top-up requests from it.
    fn is_jitter_like(&self) -> bool {
        false
    }
}

/// A non-blocking, untrusted entropy source. May be absent.
pub trait FastSource: Send + Sync {
    fn poll(&self, sink: &mut dyn FnMut(&[u8]));
    fn name(&self) -> &'static str;
}

/// A hardware RNG poller, same contract as [`FastSource`] but queried
/// separately and allowed to yield nothing.
pub trait HwSource: Send + Sync {
    fn poll(&self, sink: &mut dyn FnMut(&[u8]));
}

/// The capability set bound at `initialize` time: one required slow
/// gatherer plus two optional fast ones.
pub struct Backends {
    pub slow: Box<dyn SlowSource>,
    pub fast: Option<Box<dyn FastSource>>,
    pub hw: Option<Box<dyn HwSource>>,
}

/// `getrandom(2)`-backed slow source, probed first: matches the "getentropy
/// -style syscall" candidate in the fixed probe order.
pub struct GetrandomSource {
    rng: ring::rand::SystemRandom,
}

impl Default for GetrandomSource {
    fn default() -> Self {
        Self {
            rng: ring::rand::SystemRandom::new(),
        }
    }
}

impl SlowSource for GetrandomSource {
    fn gather(&self, length: usize, _level: Level, sink: &mut dyn FnMut(&[u8])) -> bool {
        use ring::rand::SecureRandom;
        let mut buf = vec![0u8; length];
        match self.rng.fill(&mut buf) {
            Ok(()) => {
                sink(&buf);
                true
            }
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "getrandom"
    }
}

/// `/dev/urandom`-backed slow source, the fallback probe candidate.
pub struct UrandomSource {
    path: &'static str,
}

impl Default for UrandomSource {
    fn default() -> Self {
        Self {
            path: "/dev/urandom",
        }
    }
}

impl SlowSource for UrandomSource {
    fn gather(&self, length: usize, _level: Level, sink: &mut dyn FnMut(&[u8])) -> bool {
        use std::io::Read;
        let mut file = match std::fs::File::open(self.path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut buf = vec![0u8; length];
        if file.read_exact(&mut buf).is_err() {
            return false;
        }
        sink(&buf);
        true
    }

    fn name(&self) -> &'static str {
        "urandom"
    }

    fn is_jitter_like(&self) -> bool {
        false
    }
}

/// CPU-timing-jitter-based slow source, the "Unix ad-hoc" probe candidate,
/// used on platforms with neither a getrandom syscall nor `/dev/urandom`.
pub struct JitterSource;

impl JitterSource {
    fn sample(&self, out: &mut [u8]) {
        let mut last = 0u64;
        for chunk in out.chunks_mut(8) {
            let start = Instant::now();
            let mut x = 1u64;
            for i in 1..97u64 {
                x = x.wrapping_mul(i).wrapping_add(i);
            }
            std::hint::black_box(&x);
            let elapsed = start.elapsed().as_nanos() as u64;
            let mixed = elapsed ^ last ^ x;
            last = mixed;
            let bytes = mixed.to_le_bytes();
            let n = chunk.len();
            chunk.copy_from_slice(&bytes[..n]);
        }
    }
}

impl SlowSource for JitterSource {
    fn gather(&self, length: usize, _level: Level, sink: &mut dyn FnMut(&[u8])) -> bool {
        let mut buf = vec![0u8; length];
        self.sample(&mut buf);
        sink(&buf);
        true
    }

    fn name(&self) -> &'static str {
        "jitter"
    }

    fn is_jitter_like(&self) -> bool {
        true
    }
}

/// `/dev/hwrng`-backed hardware poller, adapted from the project's existing
/// hardware RNG probe.
#[derive(Default)]
pub struct HwRngSource {
    available: bool,
}

impl HwRngSource {
    pub fn probe() -> Self {
        let path = std::path::Path::new("/dev/hwrng");
        let available = path.exists()
            && std::fs::File::open(path)
                .and_then(|mut f| {
                    use std::io::Read;
                    let mut buf = [0u8; 1];
                    f.read_exact(&mut buf)
                })
                .is_ok();
        Self { available }
    }
}

impl HwSource for HwRngSource {
    fn poll(&self, sink: &mut dyn FnMut(&[u8])) {
        if !self.available {
            return;
        }
        use std::io::Read;
        if let Ok(mut file) = std::fs::File::open("/dev/hwrng") {
            let mut buf = [0u8; 32];
            if file.read_exact(&mut buf).is_ok() {
                sink(&buf);
            }
        }
    }
}

/// The default fast gatherer: wall/monotonic time plus a coarse
/// resource-usage snapshot, cheap enough to call on every read.
#[derive(Default)]
pub struct DefaultFastSource;

impl FastSource for DefaultFastSource {
    fn poll(&self, sink: &mut dyn FnMut(&[u8])) {
        let now = Instant::now();
        sink(&(now.elapsed().as_nanos() as u64).to_le_bytes());

        if let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) {
            sink(&dur.as_nanos().to_le_bytes());
        }

        if let Some(usage) = resource_usage_snapshot() {
            sink(&usage);
        }
    }

    fn name(&self) -> &'static str {
        "default-fast"
    }
}

/// Snapshot of `getrusage(RUSAGE_SELF)`, folded into a small byte buffer.
/// Returns `None` on platforms where the call isn't meaningful.
#[cfg(unix)]
fn resource_usage_snapshot() -> Option<[u8; 32]> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let mut out = [0u8; 32];
    out[0..8].copy_from_slice(&(usage.ru_utime.tv_usec as u64).to_le_bytes());
    out[8..16].copy_from_slice(&(usage.ru_stime.tv_usec as u64).to_le_bytes());
    out[16..24].copy_from_slice(&(usage.ru_minflt as u64).to_le_bytes());
    out[24..32].copy_from_slice(&(usage.ru_majflt as u64).to_le_bytes());
    Some(out)
}

#[cfg(not(unix))]
fn resource_usage_snapshot() -> Option<[u8; 32]> {
    None
}

/// Belt-and-suspenders `time()`/`clock()` stir, always added on a fast poll
/// regardless of what other sources are bound.
pub(crate) fn time_and_clock_bytes() -> [u8; 16] {
    let mut out = [0u8; 16];
    #[cfg(unix)]
    unsafe {
        let t = libc::time(std::ptr::null_mut());
        let c = libc::clock();
        out[0..8].copy_from_slice(&(t as i64).to_le_bytes());
        out[8..16].copy_from_slice(&(c as i64).to_le_bytes());
    }
    #[cfg(not(unix))]
    {
        if let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) {
            out[0..8].copy_from_slice(&(dur.as_secs()).to_le_bytes());
        }
    }
    out
}

/// Runs one fast poll: the optional registered fast gatherer, then the
/// unconditional cheap sources, then the optional hardware poller. Every
/// byte is tagged `Origin::FastPoll` by the caller.
pub(crate) fn fast_poll(backends: &Backends, sink: &mut dyn FnMut(&[u8])) {
    if let Some(fast) = &backends.fast {
        fast.poll(sink);
    }
    sink(&time_and_clock_bytes());
    if let Some(hw) = &backends.hw {
        hw.poll(sink);
    }
}

/// Requests one ordinary slow poll's worth of bytes ([`SLOWPOLL_BYTES`]) at
/// `STRONG` level, tagged `Origin::SlowPoll` by the caller.
pub(crate) fn slow_poll(backends: &Backends, sink: &mut dyn FnMut(&[u8])) {
    if !backends.slow.gather(SLOWPOLL_BYTES, Level::Strong, sink) {
        super::error::fatal("slow entropy source reported failure");
    }
}

/// Requests `length` bytes from the slow source at `level`, used for extra
/// seeding / top-up requests which carry their own origin tag.
pub(crate) fn slow_request(
    backends: &Backends,
    length: usize,
    level: Level,
    sink: &mut dyn FnMut(&[u8]),
) {
    if !backends.slow.gather(length, level, sink) {
        super::error::fatal("slow entropy source reported failure");
    }
}
