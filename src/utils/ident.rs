use crate::error::EngineError;

/// Maximum identifier length accepted by MySQL.
const MAX_IDENT_LEN: usize = 64;

/// Validate a database/table name before it is spliced into statement text.
///
/// Identifiers reach the engine from user input (restore targets, CLI
/// arguments) and from server metadata; both are checked against the same
/// allow-list: ASCII alphanumerics, `_` and `$`.
pub fn validate(name: &str) -> Result<&str, EngineError> {
    if name.is_empty() || name.len() > MAX_IDENT_LEN {
        return Err(EngineError::InvalidIdentifier(name.to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(EngineError::InvalidIdentifier(name.to_string()));
    }
    Ok(name)
}

/// Backtick-quote a previously validated identifier.
pub fn quote(name: &str) -> String {
    format!("`{}`", name)
}

/// Validate then quote in one step.
pub fn quoted(name: &str) -> Result<String, EngineError> {
    validate(name).map(quote)
}
