use crate::core::error::Result;
use crate::index::view::IndexView;
use crate::search::topk::SearchResults;

/// Per-term score statistics used by the Taily model: mean and variance
/// of the term's posting scores, and its document frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureStats {
    pub mean: f64,
    pub variance: f64,
    pub frequency: f64,
}

impl FeatureStats {
    /// Statistics of one query term from the stored tables; terms absent
    /// from the index contribute zeros.
    pub fn from_view(view: &IndexView, scorer: &str, term: &str) -> Result<Self> {
        match view.term_id(term) {
            Some(term_id) => Ok(FeatureStats {
                mean: f64::from(view.score_mean(scorer, term_id)?),
                variance: f64::from(view.score_var(scorer, term_id)?),
                frequency: f64::from(view.term_collection_frequency(term_id)?),
            }),
            None => Ok(FeatureStats::default()),
        }
    }
}

/// Statistics of one query against one collection (an index or a shard).
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub features: Vec<FeatureStats>,
    pub size: u64,
}

impl CollectionStats {
    pub fn from_view(view: &IndexView, scorer: &str, terms: &[String]) -> Result<Self> {
        let features = terms
            .iter()
            .map(|term| FeatureStats::from_view(view, scorer, term))
            .collect::<Result<Vec<_>>>()?;
        Ok(CollectionStats {
            features,
            size: u64::from(view.collection_size()),
        })
    }

    /// Expected number of documents containing at least one query term.
    fn any(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let size = self.size as f64;
        let none: f64 = self
            .features
            .iter()
            .map(|feature| 1.0 - (feature.frequency / size).min(1.0))
            .product();
        size * (1.0 - none)
    }

    /// Gamma fit (shape, scale) of the query score distribution: the sum
    /// of the per-term distributions, refit by the method of moments.
    fn gamma_fit(&self) -> Option<(f64, f64)> {
        let mean: f64 = self.features.iter().map(|feature| feature.mean).sum();
        let variance: f64 = self.features.iter().map(|feature| feature.variance).sum();
        if mean <= 0.0 || variance <= 0.0 {
            return None;
        }
        Some((mean * mean / variance, variance / mean))
    }
}

/// Exact top-k threshold: the k-th score of an engine run, or 0 with
/// fewer than k hits.
pub fn exact_threshold(results: &SearchResults, k: usize) -> f64 {
    if results.results.len() < k {
        0.0
    } else {
        f64::from(results.results[k - 1].score)
    }
}

/// Estimated top-k score threshold: the score `s` such that the expected
/// number of documents scoring at least `s` equals `k`.
pub fn estimate_cutoff(stats: &CollectionStats, k: usize) -> f64 {
    let any = stats.any();
    if any <= 0.0 || k as f64 >= any {
        return 0.0;
    }
    let Some((shape, scale)) = stats.gamma_fit() else {
        return 0.0;
    };
    // E[#docs >= s] = any * Q(shape, s / scale) = k.
    let tail = k as f64 / any;
    inverse_reg_lower_gamma(shape, 1.0 - tail) * scale
}

/// Taily shard ranking: each shard's score is the expected number of its
/// documents scoring above the global top-k threshold.
pub fn score_shards(
    global: &CollectionStats,
    shards: &[CollectionStats],
    k: usize,
) -> Vec<f64> {
    let cutoff = estimate_cutoff(global, k);
    shards
        .iter()
        .map(|shard| {
            let any = shard.any();
            if any <= 0.0 {
                return 0.0;
            }
            match shard.gamma_fit() {
                Some((shape, scale)) => {
                    any * (1.0 - reg_lower_gamma(shape, cutoff / scale))
                }
                None => 0.0,
            }
        })
        .collect()
}

// Gamma special functions: Lanczos log-gamma, the regularized lower
// incomplete gamma via series / continued fraction, and its inverse by
// bisection.

const LANCZOS: [f64; 8] = [
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

fn ln_gamma(z: f64) -> f64 {
    if z < 0.5 {
        // Reflection formula.
        let pi = std::f64::consts::PI;
        return (pi / (pi * z).sin()).ln() - ln_gamma(1.0 - z);
    }
    let z = z - 1.0;
    let mut x = 0.999_999_999_999_809_93;
    for (index, coefficient) in LANCZOS.iter().enumerate() {
        x += coefficient / (z + index as f64 + 1.0);
    }
    let t = z + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (z + 0.5) * t.ln() - t + x.ln()
}

/// Regularized lower incomplete gamma P(a, x).
fn reg_lower_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        // Series representation converges quickly here.
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut n = 1.0;
        while term.abs() > sum.abs() * 1e-14 && n < 1000.0 {
            term *= x / (a + n);
            sum += term;
            n += 1.0;
        }
        sum * (-x + a * x.ln() - ln_gamma(a)).exp()
    } else {
        // Continued fraction for the upper tail (modified Lentz).
        let tiny = 1e-300;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        let mut i = 1.0;
        loop {
            let an = -i * (i - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < 1e-14 || i > 1000.0 {
                break;
            }
            i += 1.0;
        }
        1.0 - (-x + a * x.ln() - ln_gamma(a)).exp() * h
    }
}

/// Smallest x with P(a, x) >= p, by bisection.
fn inverse_reg_lower_gamma(a: f64, p: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let mut hi = a.max(1.0);
    while reg_lower_gamma(a, hi) < p {
        hi *= 2.0;
        if hi > 1e12 {
            return hi;
        }
    }
    let mut lo = 0.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if reg_lower_gamma(a, mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 * hi.max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}
