//! Counters tracked by the pool purely for observability; none of them
//! feed back into the mixing or seeding decisions.

/// Running counters for a pool instance, dumped via [`super::dump_stats`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub mixrnd: u64,
    pub mixkey: u64,
    pub slowpolls: u64,
    pub fastpolls: u64,
    pub getbytes1: u64,
    pub getbytes2: u64,
    pub naddbytes: u64,
    pub addbytes: u64,
}

impl Stats {
    pub(crate) fn log(&self) {
        tracing::info!(
            target: "rng::stats",
            mixrnd = self.mixrnd,
            mixkey = self.mixkey,
            slowpolls = self.slowpolls,
            fastpolls = self.fastpolls,
            getbytes1 = self.getbytes1,
            getbytes2 = self.getbytes2,
            naddbytes = self.naddbytes,
            addbytes = self.addbytes,
            "rng pool stats: mixrnd={} mixkey={} slowpolls={} fastpolls={} \
             getbytes1={} getbytes2={} naddbytes={} addbytes={}",
            self.mixrnd,
            self.mixkey,
            self.slowpolls,
            self.fastpolls,
            self.getbytes1,
            self.getbytes2,
            self.naddbytes,
            self.addbytes,
        );
    }
}
