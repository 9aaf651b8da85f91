//! Sequence elements.

use crate::error::{ErrorKind, Result, ScoreError};

/// A numeric sequence declared in a grain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    grain: String,
    name: String,
    /// First value handed out.
    pub start_with: i64,
    /// Step between values, never zero.
    pub increment_by: i64,
    /// Lowest value.
    pub min_value: i64,
    /// Highest value.
    pub max_value: i64,
    /// Whether the sequence wraps around.
    pub cycle: bool,
}

/// Optional sequence parameters as declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceParams {
    /// START WITH.
    pub start_with: Option<i64>,
    /// INCREMENT BY.
    pub increment_by: Option<i64>,
    /// MINVALUE.
    pub min_value: Option<i64>,
    /// MAXVALUE.
    pub max_value: Option<i64>,
    /// CYCLE.
    pub cycle: bool,
}

impl Sequence {
    /// Validates parameters and fills in defaults.
    pub fn new(grain: &str, name: &str, params: SequenceParams) -> Result<Self> {
        let fail = |message: String| {
            Err(ScoreError::element(
                ErrorKind::IllegalDefinition,
                grain,
                name,
                message,
            ))
        };

        let start_with = params.start_with.unwrap_or(1);
        let increment_by = params.increment_by.unwrap_or(1);
        if increment_by == 0 {
            return fail(format!(
                "Sequence {name} has illegal value 0 for INCREMENT BY expression."
            ));
        }
        if let (Some(min), Some(max)) = (params.min_value, params.max_value) {
            if min >= max {
                return fail(format!(
                    "MINVALUE for sequence {name} must be less than MAXVALUE"
                ));
            }
        }
        let min_value = params.min_value.unwrap_or(start_with);
        if start_with < min_value {
            return fail(format!(
                "MINVALUE for sequence {name} can't be greater than START WITH"
            ));
        }
        let max_value = params.max_value.unwrap_or(i64::MAX);
        if start_with > max_value {
            return fail(format!(
                "MAXVALUE for sequence {name} must be greater or equals START WITH"
            ));
        }
        if increment_by < 0 {
            if start_with > 0 && start_with.saturating_add(increment_by) < min_value {
                return fail(format!(
                    "Sum of arguments START WITH AND INCREMENT BY must be greater or equals \
                     MINVALUE for sequence {name} in case of descending increment"
                ));
            }
            if increment_by.unsigned_abs() >= max_value.abs_diff(min_value) {
                return fail(format!(
                    "Absolute value of 'INCREMENT BY' must be less than absolute value of \
                     subtraction of MAXVALUE and MINVALUE for sequence {name} in case of \
                     descending increment"
                ));
            }
        }

        Ok(Self {
            grain: grain.to_string(),
            name: name.to_string(),
            start_with,
            increment_by,
            min_value,
            max_value,
            cycle: params.cycle,
        })
    }

    /// Returns the sequence name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning grain name.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let seq = Sequence::new("g", "s1", SequenceParams::default()).unwrap();
        assert_eq!(seq.start_with, 1);
        assert_eq!(seq.increment_by, 1);
        assert_eq!(seq.min_value, 1);
        assert_eq!(seq.max_value, i64::MAX);
        assert!(!seq.cycle);
    }

    #[test]
    fn test_zero_increment_rejected() {
        let params = SequenceParams {
            increment_by: Some(0),
            ..SequenceParams::default()
        };
        let err = Sequence::new("g", "s1", params).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalDefinition);
    }

    #[test]
    fn test_min_max_ordering() {
        let params = SequenceParams {
            min_value: Some(10),
            max_value: Some(5),
            ..SequenceParams::default()
        };
        assert!(Sequence::new("g", "s1", params).is_err());

        let params = SequenceParams {
            start_with: Some(1),
            min_value: Some(5),
            ..SequenceParams::default()
        };
        assert!(Sequence::new("g", "s1", params).is_err());
    }

    #[test]
    fn test_descending_sequence() {
        let params = SequenceParams {
            start_with: Some(100),
            increment_by: Some(-1),
            min_value: Some(0),
            max_value: Some(100),
            cycle: true,
        };
        let seq = Sequence::new("g", "down", params).unwrap();
        assert_eq!(seq.increment_by, -1);
        assert!(seq.cycle);

        let params = SequenceParams {
            start_with: Some(1),
            increment_by: Some(-5),
            min_value: Some(0),
            max_value: Some(100),
            cycle: false,
        };
        assert!(Sequence::new("g", "down", params).is_err());
    }
}
