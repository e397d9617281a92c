use std::fmt;

use thiserror::Error;

/// User actions driving the capture/analyze state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartCamera,
    TakePicture,
    UploadImage,
    Analyze,
    Reset,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartCamera => "Start Camera",
            Action::TakePicture => "Take Picture",
            Action::UploadImage => "Upload Image",
            Action::Analyze => "Analyze Food",
            Action::Reset => "Reset",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const CAMERA_ACCESS_MESSAGE: &str =
    "Error accessing camera. Please ensure camera permissions are granted.";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Please upload an image file.")]
    InvalidFileType(String),

    #[error("No file selected.")]
    NoFileSelected,

    #[error("Failed to read {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Could not decode image: {0}")]
    UnreadableImage(String),

    #[error("Please start the camera first.")]
    NoActiveCapture,

    #[error("Failed to capture picture: {0}")]
    CaptureFailed(String),

    #[error("Failed to encode picture: {0}")]
    Encode(String),

    #[error("No picture or image uploaded yet. Please take a picture or upload an image first.")]
    NoPendingImage,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("network error: {0}")]
    NetworkFailure(String),

    #[error("service returned HTTP {status}: {message}")]
    ServiceRejected { status: u16, message: String },

    #[error("no API key configured")]
    MissingApiKey,

    #[error("{0} is not available right now")]
    ActionUnavailable(Action),
}

impl AppError {
    /// Text shown in the transient notice for this error.
    pub fn user_message(&self) -> String {
        match self {
            AppError::PermissionDenied | AppError::DeviceUnavailable(_) => {
                CAMERA_ACCESS_MESSAGE.to_string()
            }
            AppError::MalformedResponse(_) => {
                "Could not get a valid response from AI. Please try again.".to_string()
            }
            AppError::NetworkFailure(_)
            | AppError::ServiceRejected { .. }
            | AppError::MissingApiKey => format!("Error analyzing food: {}", self),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::NetworkFailure(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::UnreadableImage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_response_uses_generic_message() {
        let err = AppError::MalformedResponse("no candidates".to_string());
        assert_eq!(
            err.user_message(),
            "Could not get a valid response from AI. Please try again."
        );
    }

    #[test]
    fn test_every_camera_failure_asks_for_permissions() {
        for err in [
            AppError::PermissionDenied,
            AppError::DeviceUnavailable("rpicam-still not found".to_string()),
        ] {
            assert_eq!(
                err.user_message(),
                "Error accessing camera. Please ensure camera permissions are granted."
            );
        }
        // The log line keeps the underlying reason
        assert_eq!(
            AppError::DeviceUnavailable("rpicam-still not found".to_string()).to_string(),
            "Camera unavailable: rpicam-still not found"
        );
    }

    #[test]
    fn test_network_failure_is_prefixed() {
        let err = AppError::NetworkFailure("connection refused".to_string());
        assert_eq!(
            err.user_message(),
            "Error analyzing food: network error: connection refused"
        );
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            AppError::InvalidFileType("text/plain".into()).user_message(),
            "Please upload an image file."
        );
        assert_eq!(
            AppError::NoActiveCapture.user_message(),
            "Please start the camera first."
        );
        assert_eq!(
            AppError::ActionUnavailable(Action::UploadImage).user_message(),
            "Upload Image is not available right now"
        );
    }
}
