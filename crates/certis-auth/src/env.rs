//! Environment variable helpers shared by the Certis configuration structs.

use crate::error::{AuthError, AuthResult};
use std::str::FromStr;

/// Read and parse `key`.
///
/// Returns `Ok(None)` when the variable is unset or blank, and a
/// [`AuthError::ConfigError`] when it is set but unparsable.
pub fn read_env<T>(key: &str) -> AuthResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AuthError::ConfigError(format!("{key}: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(AuthError::ConfigError(format!("{key}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_none() {
        let value: Option<u64> = read_env("CERTIS_TEST_SURELY_UNSET_VARIABLE").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_unparsable_is_config_error() {
        std::env::set_var("CERTIS_TEST_BAD_NUMBER", "seven");
        let result: AuthResult<Option<u64>> = read_env("CERTIS_TEST_BAD_NUMBER");
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
        std::env::remove_var("CERTIS_TEST_BAD_NUMBER");
    }
}
