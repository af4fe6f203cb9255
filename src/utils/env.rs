//! Environment variable utilities
//!
//! Provides helpers for reading environment variables with defaults.

/// Get environment variable as Option
///
/// Returns `Some(value)` if set and non-empty, `None` otherwise.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get environment variable or return default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

/// Get environment variable as boolean
///
/// Returns `true` if value is "true", "1", "yes", "on" (case-insensitive).
/// Returns `false` otherwise or if not set.
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(false)
}

/// Get environment variable as integer
///
/// Returns `Some(value)` if set and parseable, `None` otherwise.
pub fn env_int<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    std::env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers() {
        std::env::set_var("MFE_TEST_ENV_INT", " 42 ");
        std::env::set_var("MFE_TEST_ENV_BOOL", "Yes");
        std::env::set_var("MFE_TEST_ENV_EMPTY", "");

        assert_eq!(env_int::<u32>("MFE_TEST_ENV_INT"), Some(42));
        assert!(env_bool("MFE_TEST_ENV_BOOL"));
        assert!(!env_bool("MFE_TEST_ENV_UNSET"));
        assert_eq!(env_opt("MFE_TEST_ENV_EMPTY"), None);
        assert_eq!(env_or_default("MFE_TEST_ENV_UNSET", "fallback"), "fallback");
    }
}
