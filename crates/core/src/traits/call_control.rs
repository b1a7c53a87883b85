//! Call control trait

use crate::script::CallScript;
use crate::Result;
use async_trait::async_trait;

/// Injects instructions into a live call
///
/// Implementations replace whatever the call is currently executing with the
/// given script. Scripts that should keep transcribing end with a
/// `ConnectStream` instruction.
#[async_trait]
pub trait CallControl: Send + Sync + 'static {
    /// Update the live call identified by `call_sid`
    ///
    /// Errors are recoverable; the caller decides whether to retry.
    async fn inject(&self, call_sid: &str, script: &CallScript) -> Result<()>;

    /// Adapter name for logging
    fn name(&self) -> &str;
}
