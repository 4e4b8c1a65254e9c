use crate::config::{CueSource, RingtoneConfig};
use crate::media::AudioSink;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The three audio cues a call can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Dial,
    Incoming,
    Ringback,
}

/// Plays at most one looped cue at a time through the configured sink.
pub struct RingtonePlayer {
    config: RingtoneConfig,
    sink: Arc<dyn AudioSink>,
    current: Mutex<Option<Cue>>,
}

impl RingtonePlayer {
    pub fn new(config: RingtoneConfig, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            config,
            sink,
            current: Mutex::new(None),
        }
    }

    fn source(&self, cue: Cue) -> &CueSource {
        match cue {
            Cue::Dial => &self.config.dial,
            Cue::Incoming => &self.config.incoming,
            Cue::Ringback => &self.config.ringback,
        }
    }

    /// Start a cue from the beginning, looped. Any cue already playing is
    /// stopped first; autoplay refusal from the sink is ignored.
    pub fn play(&self, cue: Cue) {
        let mut current = self.current.lock().unwrap();
        if current.is_some() {
            self.sink.stop();
        }
        let source = self.source(cue);
        if let Err(e) = self.sink.play(&source.source, source.volume.unwrap_or(1.0), true) {
            debug!(?cue, "cue playback refused: {}", e);
        }
        *current = Some(cue);
    }

    /// Halt and rewind whatever is playing.
    pub fn stop(&self) {
        let mut current = self.current.lock().unwrap();
        if current.take().is_some() {
            self.sink.stop();
        }
    }

    pub fn current(&self) -> Option<Cue> {
        *self.current.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Default)]
    struct TrackingSink {
        ops: Mutex<Vec<String>>,
        refuse: bool,
    }

    impl AudioSink for TrackingSink {
        fn play(&self, source: &str, volume: f32, looped: bool) -> anyhow::Result<()> {
            assert!(looped);
            self.ops
                .lock()
                .unwrap()
                .push(format!("play {} @{}", source, volume));
            if self.refuse {
                return Err(anyhow!("autoplay refused"));
            }
            Ok(())
        }

        fn set_stream(&self, _stream: &crate::media::RemoteStream) -> anyhow::Result<()> {
            Ok(())
        }

        fn stop(&self) {
            self.ops.lock().unwrap().push("stop".to_string());
        }
    }

    fn player_with(sink: Arc<TrackingSink>) -> RingtonePlayer {
        RingtonePlayer::new(RingtoneConfig::default(), sink)
    }

    #[test]
    fn test_play_stops_previous_cue() {
        let sink = Arc::new(TrackingSink::default());
        let player = player_with(sink.clone());

        player.play(Cue::Ringback);
        player.play(Cue::Dial);
        assert_eq!(player.current(), Some(Cue::Dial));

        let ops = sink.ops.lock().unwrap();
        assert_eq!(
            *ops,
            vec![
                "play audio/ringtone_outgoing.mp3 @1".to_string(),
                "stop".to_string(),
                "play audio/dialtone.mp3 @0.7".to_string(),
            ]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let sink = Arc::new(TrackingSink::default());
        let player = player_with(sink.clone());
        player.play(Cue::Incoming);
        player.stop();
        player.stop();
        assert_eq!(player.current(), None);
        let stops = sink
            .ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.as_str() == "stop")
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_autoplay_refusal_is_swallowed() {
        let sink = Arc::new(TrackingSink {
            refuse: true,
            ..Default::default()
        });
        let player = player_with(sink);
        player.play(Cue::Ringback);
        assert_eq!(player.current(), Some(Cue::Ringback));
    }
}
