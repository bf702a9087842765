//! Idle-percentage extraction from `metrics query` output.
//!
//! The query prints a table whose rows end in the metric's value history,
//! newest last, e.g.
//!
//! ```text
//! Object          Metric               Values
//! --------------- -------------------- --------------------------------------------
//! cicc2_group06   Guest/CPU/Load/Idle  91.00%, 92.00%, 90.50%
//! ```
//!
//! The last matching line wins, and within it the last whitespace-delimited
//! token. A trailing `%` (and the `,` of a history list) is stripped before
//! parsing.

use crate::error::ParseError;

/// Raw text of one metrics query. Lives for a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample(String);

impl RawSample {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Freshest idle percentage for `metric` in this sample.
    pub fn idle_percent(&self, metric: &str) -> Result<f64, ParseError> {
        parse_idle(&self.0, metric)
    }
}

/// Extract the most recent value of `metric` from raw query output.
pub fn parse_idle(raw: &str, metric: &str) -> Result<f64, ParseError> {
    let line = raw
        .lines()
        .rev()
        .find(|l| l.contains(metric))
        .ok_or_else(|| ParseError::NoMatchingLine {
            metric: metric.to_string(),
        })?;

    let token = line.split_whitespace().next_back().unwrap_or_default();
    let number = token.trim_end_matches(',');
    let number = number.strip_suffix('%').unwrap_or(number);

    match number.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::NotNumeric {
            token: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRIC: &str = "Guest/CPU/Load/Idle";

    #[test]
    fn parses_percentage_suffix() {
        let raw = "\
Object          Metric               Values
--------------- -------------------- ------
cicc2_group06   Guest/CPU/Load/Idle  42.50%
";
        assert_eq!(parse_idle(raw, METRIC).unwrap(), 42.5);
    }

    #[test]
    fn parses_without_suffix() {
        let raw = "cicc2_group06   Guest/CPU/Load/Idle  42.50\n";
        assert_eq!(parse_idle(raw, METRIC).unwrap(), 42.5);
    }

    #[test]
    fn last_matching_line_wins() {
        let raw = "\
cicc2_group06   Guest/CPU/Load/Idle  10.00%
something unrelated 99%
cicc2_group06   Guest/CPU/Load/Idle  20.00%
cicc2_group06   Guest/CPU/Load/Idle  87.25%
trailing noise
";
        assert_eq!(parse_idle(raw, METRIC).unwrap(), 87.25);
    }

    #[test]
    fn takes_newest_value_of_history_list() {
        let raw = "cicc2_group06   Guest/CPU/Load/Idle  91.00%, 92.00%, 90.50%\n";
        assert_eq!(parse_idle(raw, METRIC).unwrap(), 90.5);
    }

    #[test]
    fn no_matching_line() {
        let raw = "VBoxManage: error: Could not find a registered machine\n";
        assert_eq!(
            parse_idle(raw, METRIC),
            Err(ParseError::NoMatchingLine {
                metric: METRIC.to_string()
            })
        );
        assert!(parse_idle("", METRIC).is_err());
    }

    #[test]
    fn non_numeric_trailing_token() {
        let raw = "cicc2_group06   Guest/CPU/Load/Idle  n/a\n";
        assert_eq!(
            parse_idle(raw, METRIC),
            Err(ParseError::NotNumeric {
                token: "n/a".to_string()
            })
        );
    }

    #[test]
    fn header_only_line_is_not_numeric() {
        let raw = "Guest/CPU/Load/Idle\n";
        assert!(matches!(
            parse_idle(raw, METRIC),
            Err(ParseError::NotNumeric { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(parse_idle("vm Guest/CPU/Load/Idle NaN%", METRIC).is_err());
        assert!(parse_idle("vm Guest/CPU/Load/Idle inf", METRIC).is_err());
    }

    #[test]
    fn raw_sample_delegates() {
        let sample = RawSample::new("vm Guest/CPU/Load/Idle 0.00%\n");
        assert_eq!(sample.idle_percent(METRIC).unwrap(), 0.0);
        assert!(sample.as_str().starts_with("vm"));
    }
}
