/// Checks that a numerical value is in the provided interval `[a,b]` and returns early
/// with an [`Error::Config`](crate::error::Error::Config) naming the value if not
///
/// NaN is never inside an interval.
///
/// ### Example
/// ```ignore
/// let gamma = 2.0;
/// ensure_interval!(gamma, 0.0, 1.0);
/// ```
/// This returns `Err` with the message "Invalid value for \`gamma\` (2). Must be in the interval \[0, 1\]."
#[macro_export]
macro_rules! ensure_interval {
    ($var:expr, $a:expr, $b:expr) => {
        if !($var >= $a && $var <= $b) {
            return Err($crate::error::Error::Config(format!(
                "Invalid value for `{}` ({}). Must be in the interval [{}, {}].",
                stringify!($var),
                $var,
                $a,
                $b,
            )));
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, Result};

    fn check(value: f32) -> Result<()> {
        ensure_interval!(value, 0.0, 1.0);
        Ok(())
    }

    #[test]
    fn ensure_interval_bounds() {
        assert!(check(0.0).is_ok(), "lower bound is inclusive");
        assert!(check(1.0).is_ok(), "upper bound is inclusive");
        assert!(check(-0.1).is_err(), "below the interval is rejected");
        assert!(check(f32::NAN).is_err(), "NaN is rejected");

        let Err(Error::Config(msg)) = check(1.5) else {
            panic!("expected a configuration error");
        };
        assert!(msg.contains("`value`"), "message names the variable: {msg}");
    }
}
