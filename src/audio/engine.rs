// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The audio engine: lazily opens the output device, picks a backend and plays
//! notes and chords on it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, error, info, span, warn, Instrument as _, Level};

use super::instrument::{Instrument, InstrumentError};
use super::tone::ToneVoice;
use super::{AudioError, Device, Voice};
use crate::config;
use crate::pitch::{note_to_pitch, Pitch, PitchError};

/// Gain of a single sampled note.
pub const NOTE_GAIN: f32 = 1.4;

/// Gain of each sampled note in a chord.
pub const CHORD_GAIN: f32 = 1.2;

/// Peak of the synthesized tone.
pub const TONE_PEAK: f32 = 1.0;

/// The chord played after a correct answer.
pub const SUCCESS_CHORD: [&str; 3] = ["C5", "E5", "G5"];

/// How long the success chord sounds.
pub const SUCCESS_DURATION: Duration = Duration::from_millis(500);

/// Longest a note keeps sounding after its duration, including output buffering.
pub const SETTLE: Duration = Duration::from_millis(
    super::cpal::BUFFER_LATENCY.as_millis() as u64 + super::instrument::RELEASE.as_millis() as u64,
);

/// Opens an output device for the given configuration.
pub type DeviceOpener =
    Arc<dyn Fn(&config::Audio) -> Result<Arc<dyn Device>, AudioError> + Send + Sync>;

/// What the engine plays notes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    SampledInstrument,
    Synthesizer,
    /// No output device could be opened. Playback is silent.
    Unavailable,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::SampledInstrument => "sampled instrument",
            Backend::Synthesizer => "synthesizer",
            Backend::Unavailable => "unavailable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready(Backend),
}

/// Everything opened by initialization.
struct Output {
    device: Option<Arc<dyn Device>>,
    instrument: Option<Arc<Instrument>>,
    instrument_error: Option<InstrumentError>,
}

impl Output {
    fn backend(&self) -> Backend {
        match (&self.device, &self.instrument) {
            (None, _) => Backend::Unavailable,
            (Some(_), Some(_)) => Backend::SampledInstrument,
            (Some(_), None) => Backend::Synthesizer,
        }
    }
}

/// Plays notes on the configured output. Shared by `Arc`.
pub struct AudioEngine {
    config: config::Audio,
    opener: DeviceOpener,
    output: OnceCell<Output>,
    initializing: AtomicBool,
}

impl AudioEngine {
    /// Creates an engine. Nothing is opened until the first use.
    pub fn new(config: config::Audio) -> AudioEngine {
        AudioEngine::with_opener(config, Arc::new(super::get_device))
    }

    /// Creates an engine that opens its device with the given function.
    pub fn with_opener(config: config::Audio, opener: DeviceOpener) -> AudioEngine {
        AudioEngine {
            config,
            opener,
            output: OnceCell::new(),
            initializing: AtomicBool::new(false),
        }
    }

    /// Opens the device and loads the instrument. Only the first call does any work;
    /// concurrent callers wait for it to finish. Never fails: problems are logged and
    /// the engine falls back to the synthesizer, or to silence.
    pub async fn initialize(&self) {
        self.output().await;
    }

    async fn output(&self) -> &Output {
        self.output.get_or_init(|| self.open()).await
    }

    async fn open(&self) -> Output {
        self.initializing.store(true, Ordering::Release);
        let span = span!(Level::INFO, "initialize audio", device = self.config.device());

        async {
            let unavailable = || Output {
                device: None,
                instrument: None,
                instrument_error: None,
            };

            let opener = self.opener.clone();
            let config = self.config.clone();
            let device = match tokio::task::spawn_blocking(move || opener(&config)).await {
                Ok(Ok(device)) => device,
                Ok(Err(e)) => {
                    error!(err = e.to_string(), "Unable to open audio device, playback disabled");
                    return unavailable();
                }
                Err(e) => {
                    error!(err = e.to_string(), "Device open task failed, playback disabled");
                    return unavailable();
                }
            };
            info!(device = device.to_string(), "Audio device opened");

            let (instrument, instrument_error) =
                match self.load_instrument(device.sample_rate()).await {
                    Ok(instrument) => (Some(Arc::new(instrument)), None),
                    Err(e) => {
                        warn!(err = e.to_string(), "Using the synthesizer");
                        (None, Some(e))
                    }
                };

            let output = Output {
                device: Some(device),
                instrument,
                instrument_error,
            };
            info!(backend = %output.backend(), "Audio ready");
            output
        }
        .instrument(span)
        .await
    }

    async fn load_instrument(&self, sample_rate: u32) -> Result<Instrument, InstrumentError> {
        let directory = config::Audio::instrument(&self.config)
            .ok_or(InstrumentError::NotConfigured)?;

        tokio::task::spawn_blocking(move || Instrument::load(&directory, sample_rate))
            .await
            .map_err(|e| InstrumentError::Task(e.to_string()))?
    }

    pub fn state(&self) -> EngineState {
        match self.output.get() {
            Some(output) => EngineState::Ready(output.backend()),
            None if self.initializing.load(Ordering::Acquire) => EngineState::Initializing,
            None => EngineState::Uninitialized,
        }
    }

    /// True once initialized with the sampled piano.
    pub fn is_using_sampled_instrument(&self) -> bool {
        self.state() == EngineState::Ready(Backend::SampledInstrument)
    }

    /// Why the sampled instrument isn't in use, if initialization has happened.
    pub fn instrument_error(&self) -> Option<&InstrumentError> {
        self.output.get()?.instrument_error.as_ref()
    }

    /// The open device, if initialization found one.
    pub fn device(&self) -> Option<Arc<dyn Device>> {
        self.output.get()?.device.clone()
    }

    /// Resumes a suspended device. Failure is logged and playback continues.
    async fn ensure_running(&self, device: &Arc<dyn Device>) {
        if !device.is_suspended() {
            return;
        }

        let device = device.clone();
        match tokio::task::spawn_blocking(move || device.resume()).await {
            Ok(Ok(())) => debug!("Audio output resumed"),
            Ok(Err(e)) => warn!(err = e.to_string(), "Unable to resume audio output"),
            Err(e) => warn!(err = e.to_string(), "Resume task failed"),
        }
    }

    /// Plays a note given by name, e.g. "F#4".
    pub async fn play_note(&self, note: &str, duration: Duration) -> Result<(), PitchError> {
        let pitch = note_to_pitch(note)?;
        self.play_pitch(pitch, duration).await;
        Ok(())
    }

    /// Plays a pitch and waits for `duration`.
    pub async fn play_pitch(&self, pitch: Pitch, duration: Duration) {
        let span = span!(Level::INFO, "play note", note = %pitch);
        async {
            let output = self.output().await;
            let Some(device) = &output.device else {
                debug!("No audio device, skipping note");
                return;
            };
            self.ensure_running(device).await;

            let voice: Box<dyn Voice> = match &output.instrument {
                Some(instrument) => match instrument.voice(pitch, duration, NOTE_GAIN) {
                    Some(voice) => Box::new(voice),
                    None => self.tone(device.as_ref(), pitch, duration),
                },
                None => self.tone(device.as_ref(), pitch, duration),
            };

            if let Err(e) = device.add_voice(voice) {
                error!(err = e.to_string(), "Unable to play note");
            }
            tokio::time::sleep(duration).await;
        }
        .instrument(span)
        .await
    }

    fn tone(&self, device: &dyn Device, pitch: Pitch, duration: Duration) -> Box<dyn Voice> {
        Box::new(ToneVoice::new(
            pitch,
            duration,
            device.sample_rate(),
            TONE_PEAK,
        ))
    }

    /// Plays the notes together on the sampled instrument, or one after another
    /// on the synthesizer, taking `duration` in total. All notes are parsed before
    /// anything sounds.
    pub async fn play_chord(&self, notes: &[&str], duration: Duration) -> Result<(), PitchError> {
        let pitches = notes
            .iter()
            .map(|note| note_to_pitch(note))
            .collect::<Result<Vec<_>, _>>()?;
        if pitches.is_empty() {
            return Ok(());
        }

        let span = span!(Level::INFO, "play chord", notes = pitches.len());
        async {
            let output = self.output().await;
            let Some(device) = &output.device else {
                debug!("No audio device, skipping chord");
                return;
            };
            self.ensure_running(device).await;

            match &output.instrument {
                Some(instrument) => {
                    for pitch in &pitches {
                        if let Some(voice) = instrument.voice(*pitch, duration, CHORD_GAIN) {
                            if let Err(e) = device.add_voice(Box::new(voice)) {
                                error!(err = e.to_string(), "Unable to play chord note");
                            }
                        }
                    }
                    tokio::time::sleep(duration).await;
                }
                None => {
                    let step = duration / pitches.len() as u32;
                    for pitch in &pitches {
                        if let Err(e) = device.add_voice(self.tone(device.as_ref(), *pitch, step)) {
                            error!(err = e.to_string(), "Unable to play chord note");
                        }
                        tokio::time::sleep(step).await;
                    }
                }
            }
        }
        .instrument(span)
        .await;

        Ok(())
    }

    /// Waits for buffered audio and note tails to finish sounding. Returns at once
    /// if nothing was ever opened.
    pub async fn settle(&self) {
        let Some(Output {
            device: Some(_), ..
        }) = self.output.get()
        else {
            return;
        };
        tokio::time::sleep(SETTLE).await;
    }

    /// Plays the C major chord used to reward a correct answer.
    pub async fn play_success_sound(&self) {
        if let Err(e) = self.play_chord(&SUCCESS_CHORD, SUCCESS_DURATION).await {
            error!(err = e.to_string(), "Unable to play success sound");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use super::*;

    fn mock_config() -> config::Audio {
        config::Audio::new("mock-engine").with_sample_rate(8000)
    }

    fn write_note(dir: &Path, name: &str) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join(name), spec).unwrap();
        for i in 0..8000 {
            writer.write_sample(((i % 40) as i16 - 20) * 500).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_without_instrument_uses_synthesizer() {
        let engine = AudioEngine::new(mock_config());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.instrument_error().is_none());

        engine.initialize().await;
        assert_eq!(engine.state(), EngineState::Ready(Backend::Synthesizer));
        assert!(!engine.is_using_sampled_instrument());
        assert!(matches!(
            engine.instrument_error(),
            Some(InstrumentError::NotConfigured)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_with_missing_instrument_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("piano");
        let engine = AudioEngine::new(
            mock_config().with_instrument(Some(missing.to_string_lossy().to_string())),
        );

        engine.initialize().await;
        assert_eq!(engine.state(), EngineState::Ready(Backend::Synthesizer));
        assert!(matches!(
            engine.instrument_error(),
            Some(InstrumentError::Io { .. })
        ));

        // Empty directory.
        let engine = AudioEngine::new(
            mock_config().with_instrument(Some(dir.path().to_string_lossy().to_string())),
        );
        engine.initialize().await;
        assert!(matches!(
            engine.instrument_error(),
            Some(InstrumentError::NoSamples(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_with_instrument() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), "C4.wav");
        write_note(dir.path(), "G4.wav");
        let engine = AudioEngine::new(
            mock_config().with_instrument(Some(dir.path().to_string_lossy().to_string())),
        );

        engine.initialize().await;
        assert!(engine.is_using_sampled_instrument());
        assert!(engine.instrument_error().is_none());

        engine
            .play_note("D4", Duration::from_millis(20))
            .await
            .unwrap();
        let mock = engine.device().unwrap().to_mock().unwrap();
        assert_eq!(mock.played_pitches(), vec![Pitch::new(62)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_is_single_flight() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let engine = Arc::new(AudioEngine::with_opener(
            mock_config(),
            Arc::new(move |config: &config::Audio| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                super::super::get_device(config)
            }),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.initialize().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), EngineState::Ready(Backend::Synthesizer));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unavailable_device_is_silent() {
        let engine = AudioEngine::with_opener(
            mock_config(),
            Arc::new(|config: &config::Audio| {
                Err(AudioError::NoDevice(config.device().to_string()))
            }),
        );

        engine.initialize().await;
        assert_eq!(engine.state(), EngineState::Ready(Backend::Unavailable));
        assert!(engine.device().is_none());

        let start = Instant::now();
        engine
            .play_note("C4", Duration::from_millis(200))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_play_note_initializes_and_waits() {
        let engine = AudioEngine::new(mock_config());
        let start = Instant::now();
        engine
            .play_note("A4", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));

        let mock = engine.device().unwrap().to_mock().unwrap();
        assert_eq!(mock.played_pitches(), vec![Pitch::A4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_play_note_rejects_bad_names() {
        let engine = AudioEngine::new(mock_config());
        assert!(matches!(
            engine.play_note("H4", Duration::from_millis(10)).await,
            Err(PitchError::InvalidNoteFormat(_))
        ));
        assert!(matches!(
            engine.play_note("E#4", Duration::from_millis(10)).await,
            Err(PitchError::InvalidNoteName(_))
        ));
        // Nothing was opened for a note that couldn't be parsed.
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_suspended_device_is_resumed() {
        let engine =
            AudioEngine::new(config::Audio::new("mock-suspended").with_sample_rate(8000));
        engine.initialize().await;
        let mock = engine.device().unwrap().to_mock().unwrap();
        assert!(mock.is_suspended());

        engine
            .play_note("C4", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!mock.is_suspended());
        assert_eq!(mock.resume_attempts(), 1);

        // Already running: no further resume.
        engine
            .play_note("C4", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(mock.resume_attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_resume_still_plays() {
        let engine =
            AudioEngine::new(config::Audio::new("mock-suspended").with_sample_rate(8000));
        engine.initialize().await;
        let mock = engine.device().unwrap().to_mock().unwrap();
        mock.set_fail_resume(true);

        engine
            .play_note("G4", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(mock.resume_attempts(), 1);
        assert!(mock.is_suspended());
        assert_eq!(mock.played_pitches(), vec![Pitch::new(67)]);
        assert_eq!(mock.mixer().active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_resume_does_not_queue_notes() {
        let engine =
            AudioEngine::new(config::Audio::new("mock-suspended").with_sample_rate(8000));
        engine.initialize().await;
        let mock = engine.device().unwrap().to_mock().unwrap();
        mock.set_fail_resume(true);

        for note in ["C4", "D4", "E4", "F4", "G4"] {
            engine
                .play_note(note, Duration::from_millis(5))
                .await
                .unwrap();
        }
        assert_eq!(mock.resume_attempts(), 5);
        assert_eq!(mock.mixer().active_count(), 0);

        // Once the output comes back only new notes sound.
        mock.set_fail_resume(false);
        engine
            .play_note("A4", Duration::from_millis(5))
            .await
            .unwrap();
        assert!(!mock.is_suspended());
        assert_eq!(mock.mixer().active_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_is_initializing_while_opening() {
        let engine = Arc::new(AudioEngine::with_opener(
            mock_config(),
            Arc::new(|config: &config::Audio| {
                std::thread::sleep(Duration::from_millis(300));
                super::super::get_device(config)
            }),
        ));
        assert_eq!(engine.state(), EngineState::Uninitialized);

        let handle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.initialize().await })
        };

        let start = Instant::now();
        while engine.state() == EngineState::Uninitialized
            && start.elapsed() < Duration::from_millis(250)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.state(), EngineState::Initializing);
        assert!(engine.device().is_none());

        handle.await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready(Backend::Synthesizer));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_settle() {
        assert!(SETTLE >= super::super::tone::TAIL + super::super::cpal::BUFFER_LATENCY);

        let engine = AudioEngine::new(mock_config());
        let start = Instant::now();
        engine.settle().await;
        assert!(start.elapsed() < SETTLE);

        engine.initialize().await;
        let start = Instant::now();
        engine.settle().await;
        assert!(start.elapsed() >= SETTLE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_device_keeps_timing() {
        let engine = AudioEngine::new(mock_config());
        engine.initialize().await;
        let mock = engine.device().unwrap().to_mock().unwrap();
        mock.set_closed(true);

        let start = Instant::now();
        engine
            .play_note("C4", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(mock.played().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chord_on_synthesizer_is_arpeggiated() {
        let engine = AudioEngine::new(mock_config());
        let start = Instant::now();
        engine
            .play_chord(&["C4", "E4", "G4"], Duration::from_millis(150))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));

        let mock = engine.device().unwrap().to_mock().unwrap();
        let played = mock.played();
        assert_eq!(
            played.iter().map(|note| note.pitch).collect::<Vec<_>>(),
            vec![Pitch::new(60), Pitch::new(64), Pitch::new(67)]
        );
        assert!(played[2].at.duration_since(played[0].at) >= Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chord_on_instrument_is_simultaneous() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), "C5.wav");
        let engine = AudioEngine::new(
            mock_config().with_instrument(Some(dir.path().to_string_lossy().to_string())),
        );

        engine.play_success_sound().await;
        let mock = engine.device().unwrap().to_mock().unwrap();
        let played = mock.played();
        assert_eq!(
            played.iter().map(|note| note.pitch).collect::<Vec<_>>(),
            vec![Pitch::new(72), Pitch::new(76), Pitch::new(79)]
        );
        assert!(played[2].at.duration_since(played[0].at) < Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_chord_plays_nothing() {
        let engine = AudioEngine::new(mock_config());
        engine.initialize().await;
        assert!(engine
            .play_chord(&["C4", "X9"], Duration::from_millis(10))
            .await
            .is_err());
        let mock = engine.device().unwrap().to_mock().unwrap();
        assert!(mock.played().is_empty());

        engine.play_chord(&[], Duration::from_millis(10)).await.unwrap();
        assert!(mock.played().is_empty());
    }
}
