use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Audio capture constraints handed to the engine's media layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: AudioConstraint,
    pub video: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioConstraint {
    Default,
    Device(String),
}

impl MediaConstraints {
    pub fn audio_only(device: Option<&str>) -> Self {
        Self {
            audio: match device {
                Some(id) => AudioConstraint::Device(id.to_string()),
                None => AudioConstraint::Default,
            },
            video: false,
        }
    }
}

/// Classified media-acquisition failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("audio recording permission denied")]
    PermissionDenied,
    #[error("no audio recording device available")]
    DeviceNotFound,
    #[error("audio recording device hardware failure")]
    HardwareFailure,
    #[error("audio recording device error ({name}): {message}")]
    Other { name: String, message: String },
}

impl MediaError {
    /// The text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::PermissionDenied => {
                "Cannot access audio recording device. If you have denied access to \
                 your microphone, please allow it and try again. Otherwise, make sure \
                 that this application is allowed to access media devices."
                    .to_string()
            }
            MediaError::DeviceNotFound => {
                "No audio recording device available. The application requires a \
                 microphone in order to be used."
                    .to_string()
            }
            MediaError::HardwareFailure => {
                "A hardware error has occurred while trying to access the audio \
                 recording device. Please ensure that your drivers are up to date \
                 and try again."
                    .to_string()
            }
            MediaError::Other { name, message } => format!(
                "An error occurred involving the audio recording device ({}):\n{}",
                name, message
            ),
        }
    }
}

/// Opaque handle on an inbound media stream, playable through an
/// `AudioSink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
}

/// Negotiated media belonging to one dialog.
#[async_trait]
pub trait MediaChannel: Send + Sync {
    /// Enable or disable every active outbound audio track.
    fn set_senders_enabled(&self, enabled: bool);

    /// Replace the outbound audio track on every active sender with one
    /// captured under the new constraints.
    async fn replace_input(&self, constraints: &MediaConstraints) -> Result<(), MediaError>;

    /// The combined inbound stream, once at least one track arrived.
    fn remote_stream(&self) -> Option<RemoteStream>;
}

/// Playback seam for ringtones and inbound call audio. `play` errors
/// stand for the platform's autoplay policy refusing playback.
pub trait AudioSink: Send + Sync {
    fn play(&self, source: &str, volume: f32, looped: bool) -> anyhow::Result<()>;
    fn set_stream(&self, stream: &RemoteStream) -> anyhow::Result<()>;
    fn stop(&self);
}

/// Sink for headless runs.
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play(&self, _source: &str, _volume: f32, _looped: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_stream(&self, _stream: &RemoteStream) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) {}
}

/// The local audio output playing the remote party.
pub struct RemoteAudio {
    sink: Arc<dyn AudioSink>,
}

impl RemoteAudio {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }

    pub fn attach(&self, stream: &RemoteStream) {
        if let Err(e) = self.sink.set_stream(stream) {
            debug!("remote audio playback refused: {}", e);
        }
    }

    pub fn clear(&self) {
        self.sink.stop();
    }
}
