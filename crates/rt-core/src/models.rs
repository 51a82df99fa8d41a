//! Request, response, and intermediate types for Rt estimation

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{EstimateError, EstimateResult};

// =============================================================================
// Window Constants
// =============================================================================

/// First day (zero-based) for which the estimator produces a value
pub const WINDOW_BEGIN: usize = 10;

/// Number of trailing days left without a value. The last day has no
/// observed secondary cases, so its corrected estimate is undefined.
pub const TRAILING_PAD: usize = 1;

/// Smallest series that still yields a non-empty window
pub const MIN_POINTS: usize = WINDOW_BEGIN + TRAILING_PAD + 1;

// =============================================================================
// Request Types
// =============================================================================

/// Incidence series as posted by a client.
///
/// `dates` may hold any JSON scalar; labels are coerced to strings when the
/// request is validated into an [`IncidenceSeries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidenceRequest {
    /// Incidence counts, one per day
    pub data: Vec<Number>,
    /// Date labels, same length as `data`
    pub dates: Vec<Value>,
}

impl IncidenceRequest {
    /// Build a request from integer counts and string labels
    pub fn from_counts<I, D, S>(counts: I, dates: D) -> Self
    where
        I: IntoIterator<Item = u64>,
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: counts.into_iter().map(Number::from).collect(),
            dates: dates.into_iter().map(|d| Value::String(d.into())).collect(),
        }
    }
}

/// A validated incidence series ready to be handed to an estimator
#[derive(Debug, Clone, PartialEq)]
pub struct IncidenceSeries {
    /// Numbers as received, used for the cache key and for text rendering
    numbers: Vec<Number>,
    /// Same numbers as f64 for computation
    counts: Vec<f64>,
    /// Date labels coerced to strings
    labels: Vec<String>,
}

impl IncidenceSeries {
    /// Number of days in the series
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Always false for a validated series
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Incidence values as floats
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Incidence values exactly as they were received
    pub fn numbers(&self) -> &[Number] {
        &self.numbers
    }

    /// Date labels
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Memoization key for this series.
    ///
    /// Data precede dates, and both are JSON-encoded so that no two distinct
    /// `(data, dates)` pairs share a key.
    pub fn cache_key(&self) -> CacheKey {
        let data = Value::Array(self.numbers.iter().cloned().map(Value::Number).collect());
        let dates = Value::Array(self.labels.iter().cloned().map(Value::String).collect());
        CacheKey(Value::Array(vec![data, dates]).to_string())
    }

    /// Estimation window for this series
    pub fn window(&self) -> EstimationWindow {
        EstimationWindow {
            begin: WINDOW_BEGIN,
            end: self.len() - 1 - TRAILING_PAD,
        }
    }
}

impl TryFrom<IncidenceRequest> for IncidenceSeries {
    type Error = EstimateError;

    fn try_from(request: IncidenceRequest) -> EstimateResult<Self> {
        let IncidenceRequest { data, dates } = request;

        if data.is_empty() || dates.is_empty() {
            return Err(EstimateError::invalid("data and dates must be non-empty"));
        }
        if data.len() != dates.len() {
            return Err(EstimateError::invalid(format!(
                "data and dates must have the same length (got {} and {})",
                data.len(),
                dates.len()
            )));
        }
        if data.len() < MIN_POINTS {
            return Err(EstimateError::invalid(format!(
                "at least {} data points are required (got {})",
                MIN_POINTS,
                data.len()
            )));
        }

        let counts = data
            .iter()
            .enumerate()
            .map(|(i, n)| match n.as_f64() {
                Some(x) if x.is_finite() && x >= 0.0 => Ok(x),
                _ => Err(EstimateError::invalid(format!(
                    "data[{}] must be a finite non-negative number (got {})",
                    i, n
                ))),
            })
            .collect::<EstimateResult<Vec<_>>>()?;

        let labels = dates
            .iter()
            .enumerate()
            .map(|(i, d)| coerce_label(i, d))
            .collect::<EstimateResult<Vec<_>>>()?;

        Ok(Self {
            numbers: data,
            counts,
            labels,
        })
    }
}

fn coerce_label(index: usize, value: &Value) -> EstimateResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => Err(EstimateError::invalid(format!(
            "dates[{}] must be a scalar",
            index
        ))),
    }
}

/// Exact-match memoization key derived from a series
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Estimation Types
// =============================================================================

/// Inclusive, zero-based range of days the estimator produces values for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimationWindow {
    pub begin: usize,
    pub end: usize,
}

impl EstimationWindow {
    /// Number of days in the window
    pub const fn len(&self) -> usize {
        self.end + 1 - self.begin
    }

    pub const fn is_empty(&self) -> bool {
        self.end < self.begin
    }
}

/// Output of an estimator: point estimate and bounds over the window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEstimate {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Estimate aligned with the request's date axis.
///
/// Days outside the estimation window are `None` (`null` in JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    /// Point estimate
    pub v: Vec<Option<f64>>,
    /// Lower confidence bound
    pub vmin: Vec<Option<f64>>,
    /// Upper confidence bound
    pub vmax: Vec<Option<f64>>,
}

impl EstimationResult {
    /// Pad a windowed estimate out to `len` days.
    ///
    /// Fails when the estimator returned series that do not match the window.
    pub fn from_window(
        len: usize,
        window: EstimationWindow,
        raw: RawEstimate,
    ) -> EstimateResult<Self> {
        if window.end >= len {
            return Err(EstimateError::failed(format!(
                "window end {} is outside a series of {} days",
                window.end, len
            )));
        }
        for (name, series) in [
            ("point", &raw.point),
            ("lower", &raw.lower),
            ("upper", &raw.upper),
        ] {
            if series.len() != window.len() {
                return Err(EstimateError::failed(format!(
                    "estimator returned {} {} values, expected {}",
                    series.len(),
                    name,
                    window.len()
                )));
            }
        }

        Ok(Self {
            v: pad_series(len, window, &raw.point),
            vmin: pad_series(len, window, &raw.lower),
            vmax: pad_series(len, window, &raw.upper),
        })
    }

    /// Number of days covered
    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }
}

fn pad_series(len: usize, window: EstimationWindow, values: &[f64]) -> Vec<Option<f64>> {
    let mut padded = vec![None; window.begin];
    padded.extend(values.iter().map(|x| x.is_finite().then_some(*x)));
    padded.resize(len, None);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fibonacci_request() -> IncidenceRequest {
        IncidenceRequest::from_counts(
            [1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233],
            (0..12).map(|i| format!("d{}", i)),
        )
    }

    #[test]
    fn test_valid_request() {
        let series = IncidenceSeries::try_from(fibonacci_request()).unwrap();
        assert_eq!(series.len(), 12);
        assert_eq!(series.counts()[11], 233.0);
        assert_eq!(series.labels()[0], "d0");
        assert_eq!(series.window(), EstimationWindow { begin: 10, end: 10 });
    }

    #[test]
    fn test_mismatched_lengths() {
        let request: IncidenceRequest =
            serde_json::from_value(json!({"data": [1, 2, 3], "dates": ["a", "b"]})).unwrap();
        let err = IncidenceSeries::try_from(request).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidRequest(_)));
    }

    #[test]
    fn test_empty_request() {
        let request = IncidenceRequest::from_counts(Vec::new(), Vec::<String>::new());
        let err = IncidenceSeries::try_from(request).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidRequest(_)));
    }

    #[test]
    fn test_minimum_size() {
        let request = IncidenceRequest::from_counts(vec![1; 11], (0..11).map(|i| i.to_string()));
        let err = IncidenceSeries::try_from(request).unwrap_err();
        assert!(err.to_string().contains("at least 12"));
    }

    #[test]
    fn test_negative_data_rejected() {
        let mut request = fibonacci_request();
        request.data[3] = Number::from(-4);
        let err = IncidenceSeries::try_from(request).unwrap_err();
        assert!(err.to_string().contains("data[3]"));
    }

    #[test]
    fn test_scalar_dates_coerced() {
        let mut request = fibonacci_request();
        request.dates[0] = json!(20200301);
        request.dates[1] = json!(true);
        request.dates[2] = json!(null);
        request.dates[3] = json!(1.5);
        let series = IncidenceSeries::try_from(request).unwrap();
        assert_eq!(&series.labels()[..4], &["20200301", "true", "null", "1.5"]);
    }

    #[test]
    fn test_compound_date_rejected() {
        let mut request = fibonacci_request();
        request.dates[5] = json!(["2020", "03"]);
        let err = IncidenceSeries::try_from(request).unwrap_err();
        assert!(err.to_string().contains("dates[5]"));
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = IncidenceSeries::try_from(fibonacci_request()).unwrap();
        let b = IncidenceSeries::try_from(fibonacci_request()).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_sensitive_to_date_order() {
        let a = IncidenceSeries::try_from(fibonacci_request()).unwrap();
        let mut reordered = fibonacci_request();
        reordered.dates.swap(0, 1);
        let b = IncidenceSeries::try_from(reordered).unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_has_no_concatenation_collisions() {
        let mut a = IncidenceRequest::from_counts(vec![1; 12], (0..12).map(|_| "x"));
        let mut b = a.clone();
        a.data[11] = Number::from(12);
        a.dates[11] = json!("3");
        b.data[11] = Number::from(1);
        b.dates[11] = json!("23");
        let a = IncidenceSeries::try_from(a).unwrap();
        let b = IncidenceSeries::try_from(b).unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_large_numbers_keep_their_text() {
        let request: IncidenceRequest = serde_json::from_str(
            r#"{"data": [123456789012345678901234, 0.10000000000000000001, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
                "dates": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]}"#,
        )
        .unwrap();
        let series = IncidenceSeries::try_from(request).unwrap();

        assert_eq!(series.numbers()[0].to_string(), "123456789012345678901234");
        let key = series.cache_key().to_string();
        assert!(key.starts_with("[[123456789012345678901234,0.10000000000000000001,1,"));
        assert!((series.counts()[0] / 1.234_567_890_123_456_8e23 - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_window_len() {
        let window = EstimationWindow { begin: 10, end: 28 };
        assert_eq!(window.len(), 19);
        assert!(!window.is_empty());
    }

    #[test]
    fn test_padding() {
        let window = EstimationWindow { begin: 10, end: 12 };
        let raw = RawEstimate {
            point: vec![1.5, f64::NAN, 1.1],
            lower: vec![1.0, 0.9, 0.8],
            upper: vec![2.0, 1.9, 1.8],
        };
        let result = EstimationResult::from_window(14, window, raw).unwrap();

        assert_eq!(result.len(), 14);
        assert_eq!(result.vmin.len(), 14);
        assert_eq!(result.vmax.len(), 14);
        assert!(result.v[..10].iter().all(Option::is_none));
        assert_eq!(result.v[10], Some(1.5));
        assert_eq!(result.v[11], None);
        assert_eq!(result.v[12], Some(1.1));
        assert_eq!(result.v[13], None);
        assert_eq!(result.vmax[12], Some(1.8));
    }

    #[test]
    fn test_padding_rejects_wrong_length() {
        let window = EstimationWindow { begin: 10, end: 12 };
        let raw = RawEstimate {
            point: vec![1.0; 2],
            lower: vec![1.0; 3],
            upper: vec![1.0; 3],
        };
        let err = EstimationResult::from_window(14, window, raw).unwrap_err();
        assert!(matches!(err, EstimateError::EstimationFailed(_)));
    }

    #[test]
    fn test_result_serializes_nulls() {
        let result = EstimationResult {
            v: vec![None, Some(1.25)],
            vmin: vec![None, Some(1.0)],
            vmax: vec![None, Some(1.5)],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({"v": [null, 1.25], "vmin": [null, 1.0], "vmax": [null, 1.5]})
        );
    }
}
