use crate::error::ApiError;
use validator::Validate;

const MAX_IDENTIFIER_LENGTH: usize = 128;

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))
}

/// Path segments and body references to other records.
pub fn identifier(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ApiError::Validation(format!(
            "{field} must be 1..={MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ApiError::Validation(format!(
            "{field} must not contain whitespace"
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_trims_and_rejects_blank_or_spaced_values() {
        assert_eq!(identifier("user_id", " bob ").expect("valid"), "bob");
        assert!(identifier("user_id", "  ").is_err());
        assert!(identifier("user_id", "bo b").is_err());
        assert!(identifier("user_id", &"x".repeat(129)).is_err());
    }
}
