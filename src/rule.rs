//! The per-item business rule applied by the worker.

/// Classify a payload: `"fizz-buzz"` for multiples of 15, `"fizz"` for other
/// multiples of 3, `"buzz"` for other multiples of 5, otherwise the decimal
/// form of the payload.
pub fn classify(payload: i64) -> String {
    match (payload % 3 == 0, payload % 5 == 0) {
        (true, true) => "fizz-buzz".to_string(),
        (true, false) => "fizz".to_string(),
        (false, true) => "buzz".to_string(),
        (false, false) => payload.to_string(),
    }
}
