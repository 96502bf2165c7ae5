use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Renders a parameter vector compactly, for log lines.
pub struct DisplayPoint<'a> {
    values: &'a [f64],
    precision: usize,
}

impl<'a> DisplayPoint<'a> {
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }
}

impl<'a> From<&'a [f64]> for DisplayPoint<'a> {
    fn from(values: &'a [f64]) -> Self {
        DisplayPoint {
            values,
            precision: 6,
        }
    }
}

impl Display for DisplayPoint<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        let len = self.values.len();
        for (index, value) in self.values.iter().enumerate() {
            write!(f, "{value:.prec$}", prec = self.precision)?;
            if index != len - 1 {
                write!(f, ", ")?;
            }
        }
        write!(f, "]")
    }
}

/// Renders a duration as seconds with millisecond resolution.
pub struct DisplaySecs(pub Duration);

impl Display for DisplaySecs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}
