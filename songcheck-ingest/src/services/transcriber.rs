//! Speech-to-text collaborator
//!
//! The acoustic model is an external program: `<program> <args...> <audio>`
//! prints the transcript on stdout. Every call is a fresh process, so model
//! state is reloaded per task.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::tool_runner::{ToolCommand, ToolError, ToolRunner};

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Transcribe `audio`; the returned text may be empty
    async fn transcribe(&self, audio: &Path, timeout: Duration) -> Result<String, ToolError>;
}

/// Transcriber backed by a command-line program
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    base: ToolCommand,
    runner: ToolRunner,
}

impl CommandTranscriber {
    pub fn new(base: ToolCommand) -> Self {
        Self {
            base,
            runner: ToolRunner::new(),
        }
    }

    /// Build from a configured argument vector; None if empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        ToolCommand::from_argv(argv).map(Self::new)
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        self.base.program()
    }

    async fn transcribe(&self, audio: &Path, timeout: Duration) -> Result<String, ToolError> {
        let command = self.base.clone().arg(audio);
        let text = self.runner.run_capture(&command, timeout).await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_audio_path_is_last_argument() {
        let argv = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo \"  heard $1  \"".to_string(),
            "transcriber".to_string(),
        ];
        let transcriber = CommandTranscriber::from_argv(&argv).unwrap();

        let text = transcriber
            .transcribe(Path::new("/tmp/song.wav"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "heard /tmp/song.wav");
    }
}
