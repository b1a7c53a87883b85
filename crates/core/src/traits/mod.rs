//! Collaborator traits for the call bridge
//!
//! The call session never talks to an external service directly. Each
//! collaborator sits behind one of these traits so adapters can be swapped
//! and tests can run against in-process fakes.
//!
//! ```text
//! Speech:
//!   - SpeechRecognizer: opens a live recognition stream
//!   - RecognizerStream: audio in, close-stream on finish
//!
//! Knowledge:
//!   - KnowledgeQuery: transcript + history → answer
//!
//! Call control:
//!   - CallControl: inject a call script into a live call
//! ```

mod call_control;
mod knowledge;
mod speech;

pub use call_control::CallControl;
pub use knowledge::KnowledgeQuery;
pub use speech::{LiveOptions, RecognizerEvent, RecognizerStream, SpeechRecognizer};
