use std::fmt;

#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Attach the collection being read, so operators can tell which one failed
    pub fn in_collection(collection: &str, e: captrend::CaptrendError) -> Self {
        CliError(format!("collection '{collection}': {e}"))
    }
}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError(s.to_string())
    }
}

impl From<captrend::CaptrendError> for CliError {
    fn from(e: captrend::CaptrendError) -> Self {
        CliError(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use captrend::CaptrendError;

    #[test]
    fn test_collection_context_prefixes_message() {
        let err = CliError::in_collection(
            "capacity_trends",
            CaptrendError::Connection("table not found".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "collection 'capacity_trends': Connection error: table not found"
        );
    }

    #[test]
    fn test_plain_conversion_keeps_message() {
        let err: CliError = CaptrendError::Config("bad window".to_string()).into();
        assert_eq!(err.to_string(), "Configuration error: bad window");
    }
}
