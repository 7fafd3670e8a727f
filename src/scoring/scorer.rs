use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, ErrorKind, Result};

/// Which scoring function a scorer name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTag {
    Bm25,
    Ql,
}

impl ScoreTag {
    pub fn name(&self) -> &'static str {
        match self {
            ScoreTag::Bm25 => "bm25",
            ScoreTag::Ql => "ql",
        }
    }
}

impl fmt::Display for ScoreTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scorer name as it appears in query requests and file names:
/// `bm25` or `ql` for on-the-fly scoring, `bm25-8` etc. for a quantized
/// layer of the given bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorerSpec {
    pub tag: ScoreTag,
    pub bits: Option<u32>,
}

impl ScorerSpec {
    pub fn layer_name(&self) -> Option<String> {
        self.bits.map(|bits| format!("{}-{}", self.tag, bits))
    }

    pub fn is_quantized(&self) -> bool {
        self.bits.is_some()
    }
}

impl FromStr for ScorerSpec {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let (base, bits) = match name.split_once('-') {
            Some((base, bits)) => {
                let bits: u32 = bits.parse().map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidArgument,
                        format!("invalid scorer name: {}", name),
                    )
                })?;
                (base, Some(bits))
            }
            None => (name, None),
        };
        let tag = match base {
            "bm25" => ScoreTag::Bm25,
            "ql" => ScoreTag::Ql,
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("unknown scorer: {}", name),
                ));
            }
        };
        Ok(ScorerSpec { tag, bits })
    }
}

impl fmt::Display for ScorerSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.bits {
            Some(bits) => write!(f, "{}-{}", self.tag, bits),
            None => write!(f, "{}", self.tag),
        }
    }
}

/// BM25 parameters. They travel with the scorer; there is no global
/// configuration.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

/// Dirichlet-smoothed query likelihood parameters.
#[derive(Debug, Clone, Copy)]
pub struct QlParams {
    pub mu: f32,
}

impl Default for QlParams {
    fn default() -> Self {
        QlParams { mu: 2500.0 }
    }
}

/// A scorer bound to one term's collection statistics; computes the score
/// of a posting from its frequency and the document length.
#[derive(Debug, Clone, Copy)]
pub enum TermScorer {
    Bm25 {
        idf: f32,
        avg_document_size: f32,
        params: Bm25Params,
    },
    Ql {
        /// p(t|C): term occurrences over total collection occurrences.
        term_probability: f64,
        params: QlParams,
    },
}

impl TermScorer {
    pub fn bm25(
        document_frequency: u32,
        document_count: u32,
        avg_document_size: f32,
        params: Bm25Params,
    ) -> Self {
        let df = document_frequency as f32;
        let n = document_count as f32;
        let idf = ((n - df + 0.5) / (df + 0.5)).ln();
        TermScorer::Bm25 {
            idf,
            avg_document_size,
            params,
        }
    }

    pub fn ql(term_occurrences: u64, total_occurrences: u64, params: QlParams) -> Self {
        let term_probability = if total_occurrences > 0 {
            term_occurrences as f64 / total_occurrences as f64
        } else {
            0.0
        };
        TermScorer::Ql {
            term_probability,
            params,
        }
    }

    pub fn score(&self, frequency: u32, document_size: u32) -> f32 {
        match self {
            TermScorer::Bm25 {
                idf,
                avg_document_size,
                params,
            } => {
                let tf = frequency as f32;
                let len_ratio = document_size as f32 / avg_document_size;
                idf * tf * (params.k1 + 1.0)
                    / (tf + params.k1 * (1.0 - params.b + params.b * len_ratio))
            }
            TermScorer::Ql {
                term_probability,
                params,
            } => {
                let tf = frequency as f64;
                let mu = f64::from(params.mu);
                ((tf + mu * term_probability) / (document_size as f64 + mu)).ln() as f32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_spec_parsing() {
        let spec: ScorerSpec = "bm25".parse().unwrap();
        assert_eq!(spec.tag, ScoreTag::Bm25);
        assert!(!spec.is_quantized());
        assert_eq!(spec.layer_name(), None);

        let spec: ScorerSpec = "bm25-8".parse().unwrap();
        assert_eq!(spec.bits, Some(8));
        assert_eq!(spec.layer_name().unwrap(), "bm25-8");

        let spec: ScorerSpec = "ql-24".parse().unwrap();
        assert_eq!(spec.tag, ScoreTag::Ql);
        assert_eq!(spec.bits, Some(24));

        assert!("tfidf".parse::<ScorerSpec>().is_err());
        assert!("bm25-x".parse::<ScorerSpec>().is_err());
    }

    #[test]
    fn test_bm25_prefers_shorter_documents() {
        let scorer = TermScorer::bm25(4, 10, 8.8, Bm25Params::default());
        let short = scorer.score(1, 8);
        let long = scorer.score(1, 10);
        assert!(short > long);
        assert!(short > 0.0);
    }

    #[test]
    fn test_bm25_saturates_with_frequency() {
        let scorer = TermScorer::bm25(2, 100, 10.0, Bm25Params::default());
        let once = scorer.score(1, 10);
        let twice = scorer.score(2, 10);
        let many = scorer.score(50, 10);
        assert!(twice > once);
        // Saturation: the marginal gain shrinks.
        assert!(twice - once > (many - twice) / 48.0);
    }

    #[test]
    fn test_ql_scores() {
        let scorer = TermScorer::ql(10, 1000, QlParams::default());
        let present = scorer.score(3, 10);
        let sparse = scorer.score(1, 10);
        assert!(present > sparse);

        // Matches the closed form.
        let expected = ((3.0_f64 + 2500.0 * 0.01) / (10.0 + 2500.0)).ln();
        assert!((f64::from(present) - expected).abs() < 1e-6);
    }
}
