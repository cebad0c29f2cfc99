//! Error taxonomy for the try-on pipeline.
//!
//! Errors fall into two groups. Per-frame faults ([`TryOnError::MissingLandmarks`],
//! [`TryOnError::DegenerateGeometry`]) are recovered locally by skipping the
//! overlay for that frame. Session-level faults (asset loads, detector start-up,
//! camera acquisition) are surfaced to the caller, which decides whether to fall
//! back to a simpler render mode or end the session.

pub type TryOnResult<T> = Result<T, TryOnError>;

#[derive(thiserror::Error, Debug)]
pub enum TryOnError {
    #[error("missing landmarks: {0}")]
    MissingLandmarks(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("asset load failed: {0}")]
    AssetLoad(String),

    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("detector initialization failed: {0}")]
    DetectorInit(String),

    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("graphics error: {0}")]
    Gpu(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TryOnError {
    pub fn missing_landmarks(msg: impl Into<String>) -> Self {
        Self::MissingLandmarks(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    pub fn asset_load(msg: impl Into<String>) -> Self {
        Self::AssetLoad(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedAsset(msg.into())
    }

    pub fn detector_init(msg: impl Into<String>) -> Self {
        Self::DetectorInit(msg.into())
    }

    pub fn camera(msg: impl Into<String>) -> Self {
        Self::CameraUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            TryOnError::missing_landmarks("x")
                .to_string()
                .contains("missing landmarks:")
        );
        assert!(
            TryOnError::asset_load("x")
                .to_string()
                .contains("asset load failed:")
        );
        assert!(
            TryOnError::camera("denied")
                .to_string()
                .contains("camera unavailable: denied")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = TryOnError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
