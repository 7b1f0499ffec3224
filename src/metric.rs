use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Distance function names understood by the index engine's `--dist_fn`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistFn {
    L2,
    IP,
    #[serde(rename = "cosine")]
    Cosine,
}

impl fmt::Display for DistFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistFn::L2 => f.write_str("L2"),
            DistFn::IP => f.write_str("IP"),
            DistFn::Cosine => f.write_str("cosine"),
        }
    }
}

#[inline]
pub fn squared_l2(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut s = 0.0f64;
    for i in 0..a.len() {
        let d = a[i] - b[i];
        s += d * d;
    }
    s
}

/// Exact euclidean distance. Refuses vectors of different length instead of
/// truncating to the shorter one.
#[inline]
pub fn euclidean(query: &[f64], record: &[f64]) -> Result<f64> {
    if query.len() != record.len() {
        return Err(EvalError::DimensionMismatch { query: query.len(), record: record.len() });
    }
    Ok(squared_l2(query, record).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_is_exact() {
        let d = euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert_eq!(d, 5.0);
        assert_eq!(euclidean(&[1.5], &[1.5]).unwrap(), 0.0);
    }

    #[test]
    fn euclidean_rejects_dimension_mismatch() {
        let err = euclidean(&[0.0, 1.0], &[0.0]).unwrap_err();
        assert!(matches!(err, EvalError::DimensionMismatch { query: 2, record: 1 }));
    }

    #[test]
    fn dist_fn_renders_engine_names() {
        assert_eq!(DistFn::L2.to_string(), "L2");
        assert_eq!(DistFn::Cosine.to_string(), "cosine");
        let parsed: DistFn = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(parsed, DistFn::Cosine);
    }
}
