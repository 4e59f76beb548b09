use crate::error::CoreError;

/// Canonical form of a currency code: surrounding whitespace removed, upper-cased.
pub fn normalize_currency(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Normalizes a currency code and rejects it if nothing is left.
pub fn require_currency(field: &str, raw: &str) -> Result<String, CoreError> {
    let code = normalize_currency(raw);
    if code.is_empty() {
        return Err(CoreError::invalid(field, "currency code is required"));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_currency("  eur "), "EUR");
        assert_eq!(normalize_currency(""), "");
    }

    #[test]
    fn rejects_blank_codes() {
        assert_eq!(require_currency("from_currency", " usd").unwrap(), "USD");
        assert!(matches!(
            require_currency("from_currency", "   "),
            Err(CoreError::InvalidInput(field, _)) if field == "from_currency"
        ));
    }
}
