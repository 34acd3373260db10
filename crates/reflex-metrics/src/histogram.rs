//! Log-linear latency histogram.
//!
//! Values below 128 ns get one bucket each. Above that, every power of
//! two `[2^k, 2^(k+1))` is split into 128 equal sub-buckets, so a bucket
//! is never wider than 1/128 of its lower bound. Reporting the bucket
//! midpoint keeps relative error under 0.4%.
//!
//! Recording is O(1) and the estimator is exact-order deterministic:
//! the same samples in any order give the same quantiles.

const SUB_BUCKET_BITS: u32 = 7;
const SUB_BUCKETS: u64 = 1 << SUB_BUCKET_BITS;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyHistogram {
    counts: Vec<u64>,
    len: u64,
    sum_ns: u128,
    min_ns: u64,
    max_ns: u64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, nanos: u64) {
        let index = bucket_index(nanos);
        if index >= self.counts.len() {
            self.counts.resize(index + 1, 0);
        }
        self.counts[index] += 1;

        if self.len == 0 {
            self.min_ns = nanos;
            self.max_ns = nanos;
        } else {
            self.min_ns = self.min_ns.min(nanos);
            self.max_ns = self.max_ns.max(nanos);
        }
        self.len += 1;
        self.sum_ns += u128::from(nanos);
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.len = 0;
        self.sum_ns = 0;
        self.min_ns = 0;
        self.max_ns = 0;
    }

    /// Value at quantile `q` in nanoseconds: the midpoint of the bucket
    /// holding the sample of rank `ceil(q * n)`. `None` when empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let rank = ((q.clamp(0.0, 1.0) * self.len as f64).ceil() as u64).clamp(1, self.len);

        let mut seen = 0u64;
        for (index, &count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= rank {
                let (low, width) = bucket_bounds(index);
                let mid = low as f64 + (width - 1) as f64 / 2.0;
                // Never report outside the observed range.
                return Some(mid.clamp(self.min_ns as f64, self.max_ns as f64));
            }
        }
        Some(self.max_ns as f64)
    }

    pub fn quantile_us(&self, q: f64) -> Option<f64> {
        self.quantile(q).map(|ns| ns / 1_000.0)
    }

    pub fn mean_us(&self) -> Option<f64> {
        (self.len > 0).then(|| self.sum_ns as f64 / self.len as f64 / 1_000.0)
    }

    pub fn max_us(&self) -> Option<f64> {
        (self.len > 0).then(|| self.max_ns as f64 / 1_000.0)
    }
}

fn bucket_index(value: u64) -> usize {
    if value < SUB_BUCKETS {
        return value as usize;
    }
    let shift = (63 - value.leading_zeros()) - SUB_BUCKET_BITS;
    let sub = (value >> shift) - SUB_BUCKETS;
    (SUB_BUCKETS + u64::from(shift) * SUB_BUCKETS + sub) as usize
}

/// Lower bound and width of bucket `index`.
fn bucket_bounds(index: usize) -> (u64, u64) {
    let index = index as u64;
    if index < SUB_BUCKETS {
        return (index, 1);
    }
    let shift = (index - SUB_BUCKETS) / SUB_BUCKETS;
    let sub = (index - SUB_BUCKETS) % SUB_BUCKETS;
    ((SUB_BUCKETS + sub) << shift, 1 << shift)
}
