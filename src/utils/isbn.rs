//! ISBN normalization and checksum validation.

/// Strip separators and uppercase a trailing `x`.
///
/// Returns `None` if the result is not 10 or 13 characters of ISBN alphabet.
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '\u{2010}' | '\u{2013}'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let ok = match cleaned.len() {
        10 => {
            cleaned[..9].chars().all(|c| c.is_ascii_digit())
                && cleaned[9..].chars().all(|c| c.is_ascii_digit() || c == 'X')
        }
        13 => cleaned.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    };

    ok.then_some(cleaned)
}

/// Check an ISBN-10 or ISBN-13 checksum (input may contain separators).
pub fn is_valid(raw: &str) -> bool {
    match normalize(raw) {
        Some(isbn) if isbn.len() == 10 => isbn10_checksum_ok(&isbn),
        Some(isbn) => isbn13_checksum_ok(&isbn),
        None => false,
    }
}

/// Normalize to ISBN-13, converting valid ISBN-10 input.
pub fn to_isbn13(raw: &str) -> Option<String> {
    let isbn = normalize(raw)?;
    if isbn.len() == 13 {
        return isbn13_checksum_ok(&isbn).then_some(isbn);
    }
    if !isbn10_checksum_ok(&isbn) {
        return None;
    }

    let body = format!("978{}", &isbn[..9]);
    let check = isbn13_check_digit(&body);
    Some(format!("{}{}", body, check))
}

fn isbn10_checksum_ok(isbn: &str) -> bool {
    let sum: u32 = isbn
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let value = if c == 'X' { 10 } else { c.to_digit(10).unwrap_or(0) };
            value * (10 - i as u32)
        })
        .sum();
    sum % 11 == 0
}

fn isbn13_checksum_ok(isbn: &str) -> bool {
    let expected = isbn[12..].chars().next().and_then(|c| c.to_digit(10));
    expected == Some(isbn13_check_digit(&isbn[..12]))
}

fn isbn13_check_digit(body: &str) -> u32 {
    let sum: u32 = body
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    (10 - sum % 10) % 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize("978-0-306-40615-7").as_deref(), Some("9780306406157"));
        assert_eq!(normalize("0-8044-2957-x").as_deref(), Some("080442957X"));
        assert_eq!(normalize("12345"), None);
        assert_eq!(normalize("97803064061X7"), None);
    }

    #[test]
    fn test_checksums() {
        assert!(is_valid("9780306406157"));
        assert!(!is_valid("9780306406158"));
        assert!(is_valid("080442957X"));
        assert!(!is_valid("0804429571"));
    }

    #[test]
    fn test_isbn10_to_13() {
        assert_eq!(to_isbn13("0306406152").as_deref(), Some("9780306406157"));
        assert_eq!(to_isbn13("0306406153"), None);
    }
}
