/// Error types shared by the relay and the client crates.
///
/// These cover configuration problems that both binaries hit while reading their
/// environment. Crate-specific errors should wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("{name} environment variable is required")]
    MissingEnv { name: &'static str },

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Read a required, non-empty environment variable.
pub fn require_env(name: &'static str) -> Result<String, CommonError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(CommonError::MissingEnv { name }),
    }
}

/// Read an optional environment variable and parse it, rejecting unparseable values
/// instead of silently falling back.
pub fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, CommonError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CommonError::InvalidEnv { name, value: raw }),
        _ => Ok(None),
    }
}
