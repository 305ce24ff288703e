//! Voice Gateways - speech-to-text and text-to-speech
//!
//! The audio edge of Hark, treated as two pure conversions:
//! - **Transcription** (`transcribe`) - recorded audio bytes to text
//! - **Speech** (`speak`) - reply text to played-back audio, serialized
//!   through a FIFO queue so utterances never overlap
//!
//! Capture and codec concerns live outside this workspace; these gateways
//! only see finished audio blobs and finished reply strings.

pub mod speak;
pub mod transcribe;

pub use speak::{AudioSink, HttpSynthesizer, SpeechGateway, SpeechQueue, SynthesisError, Synthesizer};
pub use transcribe::{HttpTranscriber, TranscriptionError, TranscriptionGateway};
