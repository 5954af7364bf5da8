//! Error types for the labeling core and its collaborators.

use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, LabelError>;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("identity `{0}` already exists")]
    AlreadyExists(String),

    #[error("identity name is empty")]
    EmptyIdentityName,

    #[error("identity name `{0}` cannot be used as a folder name")]
    InvalidIdentityName(String),

    #[error("roster is frozen, identities can no longer be declared")]
    RosterFrozen,

    #[error("roster must be frozen before processing starts")]
    RosterNotFrozen,

    #[error("cannot place {count} colors at least {min_distance} apart")]
    ColorSpaceExhausted { count: usize, min_distance: f32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown stream {0}")]
    UnknownStream(usize),

    #[error("track {track_id} was never registered on stream {stream}")]
    UnknownTrack { stream: usize, track_id: u64 },

    #[error("identity slot {0} is not in the roster")]
    UnknownIdentity(usize),

    #[error("not every active stream has a batch ready for review")]
    BarrierNotSatisfied,

    #[error("frame source error: {0}")]
    FrameSource(String),

    #[error("detector error: {0}")]
    Detector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LabelError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn frame_source<S: Into<String>>(msg: S) -> Self {
        Self::FrameSource(msg.into())
    }

    pub fn detector<S: Into<String>>(msg: S) -> Self {
        Self::Detector(msg.into())
    }
}
