//! Shared result type.
//!
//! Store and bus seams return their errors as a rootcause `Report`, so a
//! lookup failure keeps whatever context the adapter attached (query, subject,
//! stream) while callers still match on the typed error underneath. The error
//! enums themselves live next to the code that raises them.

use rootcause::Report;

/// A result whose error is a [`Report`] over the context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    enum LookupError {
        Missing { key: String },
    }

    impl fmt::Display for LookupError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Missing { key } => write!(f, "{key} is not bound"),
            }
        }
    }

    impl std::error::Error for LookupError {}

    fn lookup(key: &str) -> Result<u32, LookupError> {
        match key {
            "hook-1" => Ok(7),
            other => Err(LookupError::Missing {
                key: other.to_string(),
            }
            .into()),
        }
    }

    fn doubled(key: &str) -> Result<u32, LookupError> {
        Ok(lookup(key)? * 2)
    }

    #[test]
    fn typed_errors_survive_propagation() {
        assert_eq!(doubled("hook-1").expect("bound"), 14);

        let report = doubled("hook-9").expect_err("unbound");
        assert_eq!(
            report.current_context(),
            &LookupError::Missing {
                key: "hook-9".to_string()
            }
        );
        assert!(report.to_string().contains("hook-9 is not bound"));
    }
}
