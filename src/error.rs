use thiserror::Error;

/// Failures surfaced by the capture controller.
///
/// Everything except `AlreadyActive` and `Cancelled` is an acquisition
/// problem the user can fix and retry.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a capture session is already active")]
    AlreadyActive,
    #[error("no audio input device available")]
    NoDevice,
    #[error("audio input device not found: {0}")]
    DeviceNotFound(String),
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("no usable input configuration: {0}")]
    StreamConfig(String),
    #[error("failed to open input stream: {0}")]
    StreamBuild(String),
    #[error("unsupported sample format {0}")]
    UnsupportedFormat(String),
    #[error("audio context unavailable: {0}")]
    Context(String),
    #[error("capture was stopped before the device became ready")]
    Cancelled,
    #[error("recorder failed: {0}")]
    Recorder(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wav(#[from] hound::Error),
}
