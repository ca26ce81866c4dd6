//! Error handling for the accessibility auditor

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Camera acquisition or capture error
    #[error("Camera error: {0}")]
    Camera(String),

    /// Camera permission refused (terminal until the user retries)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Inference service returned something unusable
    #[error("Inference error: {0}")]
    Inference(String),

    /// API error (non-success status from the inference service)
    #[error("API error: {0}")]
    Api(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Base64 payload error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable code, used in hub alerts and log fields
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Camera(_) => "CAMERA_ERROR",
            Error::PermissionDenied(_) => "PERMISSION_DENIED",
            Error::Inference(_) => "INFERENCE_ERROR",
            Error::Api(_) => "API_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Image(_) => "IMAGE_ERROR",
            Error::Base64(_) => "BASE64_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error means the camera refused access
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::PermissionDenied("cam".into()).code(), "PERMISSION_DENIED");
        assert_eq!(Error::Parse("bad".into()).code(), "PARSE_ERROR");
        assert!(Error::PermissionDenied("cam".into()).is_permission_denied());
        assert!(!Error::Camera("cam".into()).is_permission_denied());
    }

    #[test]
    fn test_from_serde_error() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }
}
