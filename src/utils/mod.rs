//! Shared helpers.

pub mod isbn;

/// Format a duration in milliseconds for log output.
pub fn format_millis(ms: u128) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Years after publication until a US work enters the public domain.
pub const PUBLIC_DOMAIN_TERM_YEARS: i32 = 95;

/// Whether a work published in `year` is in the US public domain during
/// `current_year`.
pub fn public_domain_by_year(year: i32, current_year: i32) -> bool {
    year + PUBLIC_DOMAIN_TERM_YEARS < current_year
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(250), "250ms");
        assert_eq!(format_millis(1500), "1.5s");
    }

    #[test]
    fn test_public_domain_by_year() {
        assert!(public_domain_by_year(1930, 2026));
        assert!(!public_domain_by_year(1931, 2026));
    }
}
