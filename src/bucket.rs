//! Latency bucket classification
//!
//! Durations arrive in nanoseconds. They are scaled by `>> 20` (divide by
//! 1,048,576, roughly milliseconds) and placed into one of eight ordered
//! buckets using a "< upper bound" rule, so a scaled value of exactly 4
//! lands in `4-8ms`.

/// Shift that turns nanoseconds into the (approximate) millisecond scale
pub const SCALE_SHIFT: u32 = 20;

/// Shift applied to a duration before it is accumulated into `latency_max`
/// and compared against thresholds
pub const COARSE_SHIFT: u32 = 10;

/// Number of histogram buckets
pub const BUCKET_COUNT: usize = 8;

/// Upper bounds (exclusive, scaled unit) of every bucket but the last
const UPPER_BOUNDS: [u64; BUCKET_COUNT - 1] = [1, 4, 8, 16, 32, 64, 128];

/// One of the eight ordered latency buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LatencyBucket {
    Lat0To1,
    Lat1To4,
    Lat4To8,
    Lat8To16,
    Lat16To32,
    Lat32To64,
    Lat64To128,
    Lat128Plus,
}

impl LatencyBucket {
    /// All buckets in ascending order
    pub const ALL: [LatencyBucket; BUCKET_COUNT] = [
        LatencyBucket::Lat0To1,
        LatencyBucket::Lat1To4,
        LatencyBucket::Lat4To8,
        LatencyBucket::Lat8To16,
        LatencyBucket::Lat16To32,
        LatencyBucket::Lat32To64,
        LatencyBucket::Lat64To128,
        LatencyBucket::Lat128Plus,
    ];

    /// Classify a raw duration in nanoseconds
    #[inline]
    pub fn classify(duration_ns: u64) -> Self {
        Self::classify_scaled(duration_ns >> SCALE_SHIFT)
    }

    /// Classify a duration that is already in the scaled unit
    #[inline]
    pub fn classify_scaled(scaled: u64) -> Self {
        for (i, &upper) in UPPER_BOUNDS.iter().enumerate() {
            if scaled < upper {
                return Self::ALL[i];
            }
        }
        LatencyBucket::Lat128Plus
    }

    /// Position of the bucket in the histogram
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label used on the status surface
    pub fn label(self) -> &'static str {
        match self {
            LatencyBucket::Lat0To1 => "0-1ms",
            LatencyBucket::Lat1To4 => "1-4ms",
            LatencyBucket::Lat4To8 => "4-8ms",
            LatencyBucket::Lat8To16 => "8-16ms",
            LatencyBucket::Lat16To32 => "16-32ms",
            LatencyBucket::Lat32To64 => "32-64ms",
            LatencyBucket::Lat64To128 => "64-128ms",
            LatencyBucket::Lat128Plus => ">=128ms",
        }
    }
}

/// Coarsen a duration for accumulation and threshold comparison
#[inline]
pub fn coarsen(duration_ns: u64) -> u64 {
    duration_ns >> COARSE_SHIFT
}
