//! Access-code helpers (generation, constant-time compare)

use rand::Rng;
use subtle::ConstantTimeEq;

/// Generate a room access code: 6 uppercase alphanumeric chars.
pub fn generate_access_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();

    (0..6)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Constant-time access-code comparison, case-insensitive on the supplied
/// side (stored codes are already uppercase).
pub fn access_code_matches(stored: &str, supplied: &str) -> bool {
    let supplied = supplied.trim().to_uppercase();
    stored.as_bytes().ct_eq(supplied.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_uppercase_alphanumeric() {
        for _ in 0..50 {
            let code = generate_access_code();
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn comparison_ignores_supplied_case_and_whitespace() {
        assert!(access_code_matches("7F3A9B", "7f3a9b"));
        assert!(access_code_matches("7F3A9B", " 7F3A9B "));
        assert!(!access_code_matches("7F3A9B", "7F3A9C"));
        assert!(!access_code_matches("7F3A9B", ""));
    }
}
