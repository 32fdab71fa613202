//! Error types for directory service operations

/// Error returned by `DirectoryApi` operations
#[derive(Debug, Clone)]
pub enum ApiError {
    /// An email address resolved to more than one account
    DuplicateIdentity { email: String },
    /// The requested record does not exist
    NotFound { what: String },
    /// The service rejected or failed the request
    Remote { message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::DuplicateIdentity { email } => {
                write!(f, "multiple accounts exist for email address: {}", email)
            }
            ApiError::NotFound { what } => write!(f, "not found: {}", what),
            ApiError::Remote { message } => write!(f, "directory service error: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Build a Remote error from any displayable cause
    pub fn remote(message: impl std::fmt::Display) -> Self {
        ApiError::Remote {
            message: message.to_string(),
        }
    }

    /// Whether this error means the email maps to more than one account
    pub fn is_duplicate_identity(&self) -> bool {
        matches!(self, ApiError::DuplicateIdentity { .. })
    }
}
