#![forbid(unsafe_code)]

// Vote statistics over a revealed round

/// Aggregates derived from the numeric votes of a revealed round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteStats {
    pub min: f64,
    pub max: f64,
    /// `ceil(sum / count)` over the numeric votes.
    pub average: f64,
}

/// Computes min/max/average over the votes that parse as meaningful
/// numbers. Non-numeric values (including NaN spellings) and zero are
/// excluded from the aggregate; they still appear literally in the
/// per-player snapshot. Returns `None` when no vote qualifies.
pub fn calculate<'a, I>(choices: I) -> Option<VoteStats>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    let mut sum = 0.0;
    let mut count = 0u32;

    for raw in choices {
        let value: f64 = match raw.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if value.is_nan() || value == 0.0 {
            continue;
        }

        min = Some(min.map_or(value, |m| m.min(value)));
        max = Some(max.map_or(value, |m| m.max(value)));
        sum += value;
        count += 1;
    }

    match (min, max) {
        (Some(min), Some(max)) => Some(VoteStats {
            min,
            max,
            average: (sum / f64::from(count)).ceil(),
        }),
        _ => None,
    }
}
