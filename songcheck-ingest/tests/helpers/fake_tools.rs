//! Stub external tools
//!
//! Each tool is a `/bin/sh` script run as `["/bin/sh", script, log]`, so the
//! script never needs the executable bit. Every invocation appends one line
//! to `log`, which tests read to count tool calls.

use std::path::{Path, PathBuf};

use songcheck_ingest::config::{IngestConfig, ResolvedPaths, SeparationFormat};

const DEMUCS_OK: &str = r#"
log="$1"; shift
echo "demucs $*" >> "$log"
out=""; model=""; ext="wav"; input=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -n) model="$2"; shift 2 ;;
    --mp3) ext="mp3"; shift ;;
    --device=*) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input")
stem="${name%.*}"
mkdir -p "$out/$model/$stem"
cp "$input" "$out/$model/$stem/vocals.$ext"
cp "$input" "$out/$model/$stem/drums.$ext"
"#;

const DEMUCS_FAIL: &str = r#"
log="$1"; shift
echo "demucs $*" >> "$log"
out="$2"
mkdir -p "$out/htdemucs/partial"
echo "half written" > "$out/htdemucs/partial/vocals.wav"
echo "separation crashed" >&2
exit 3
"#;

const SLOW_TOOL: &str = r#"
log="$1"; shift
echo "slow $*" >> "$log"
exec sleep 30
"#;

/// How the fake ffmpeg handles the silence-removal call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceMode {
    /// Copy input to output like the tempo call
    Copy,
    /// Exit 0 but write a file too small to validate
    TinyOutput,
    /// Exit 0 without writing anything
    NoOutput,
    /// Exit 1
    Fail,
}

fn ffmpeg_script(silence: SilenceMode) -> String {
    let silence_action = match silence {
        SilenceMode::Copy => r#"cp "$input" "$last""#,
        SilenceMode::TinyOutput => r#"printf 'tiny' > "$last""#,
        SilenceMode::NoOutput => "true",
        SilenceMode::Fail => "echo 'silenceremove failed' >&2; exit 1",
    };
    format!(
        r#"
log="$1"; shift
if [ "$1" = "-version" ]; then echo "ffmpeg version 0.0-fake"; exit 0; fi
echo "ffmpeg $*" >> "$log"
input=""; last=""; prev=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then input="$a"; fi
  prev="$a"
  last="$a"
done
case "$*" in
  *silenceremove*) {silence_action} ;;
  *) cp "$input" "$last" ;;
esac
"#
    )
}

fn transcriber_script(text: &str) -> String {
    format!(
        r#"
log="$1"; shift
echo "transcribe $*" >> "$log"
printf '%s\n' '{}'
"#,
        text.replace('\'', "")
    )
}

/// A set of stub tools in one directory
pub struct FakeTools {
    pub dir: PathBuf,
    pub log: PathBuf,
    pub separation: Vec<String>,
    pub ffmpeg: Vec<String>,
    pub transcriber: Vec<String>,
}

impl FakeTools {
    /// Working tools; the transcriber prints `transcript`
    pub fn new(dir: &Path, transcript: &str) -> Self {
        let log = dir.join("tool_calls.log");
        std::fs::write(&log, "").expect("create log");
        let mut tools = Self {
            dir: dir.to_path_buf(),
            log,
            separation: Vec::new(),
            ffmpeg: Vec::new(),
            transcriber: Vec::new(),
        };
        tools.separation = tools.script("demucs.sh", DEMUCS_OK);
        tools.ffmpeg = tools.script("ffmpeg.sh", &ffmpeg_script(SilenceMode::Copy));
        tools.transcriber = tools.script("transcribe.sh", &transcriber_script(transcript));
        tools
    }

    pub fn with_failing_separation(mut self) -> Self {
        self.separation = self.script("demucs_fail.sh", DEMUCS_FAIL);
        self
    }

    pub fn with_slow_separation(mut self) -> Self {
        self.separation = self.script("demucs_slow.sh", SLOW_TOOL);
        self
    }

    /// Separation that succeeds, but only after `delay_secs`
    pub fn with_late_separation(mut self, delay_secs: u64) -> Self {
        let body = format!("sleep {}\n{}", delay_secs, DEMUCS_OK);
        self.separation = self.script("demucs_late.sh", &body);
        self
    }

    pub fn with_slow_transcriber(mut self) -> Self {
        self.transcriber = self.script("transcribe_slow.sh", SLOW_TOOL);
        self
    }

    pub fn with_silence_mode(mut self, mode: SilenceMode) -> Self {
        self.ffmpeg = self.script("ffmpeg_variant.sh", &ffmpeg_script(mode));
        self
    }

    pub fn with_transcript(mut self, text: &str) -> Self {
        self.transcriber = self.script("transcribe_variant.sh", &transcriber_script(text));
        self
    }

    fn script(&self, name: &str, body: &str) -> Vec<String> {
        let path = self.dir.join(name);
        std::fs::write(&path, body).expect("write fake tool");
        vec![
            "/bin/sh".to_string(),
            path.to_string_lossy().into_owned(),
            self.log.to_string_lossy().into_owned(),
        ]
    }

    /// Logged invocations whose line starts with `tool`
    pub fn calls(&self, tool: &str) -> usize {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .filter(|line| line.starts_with(tool))
            .count()
    }

    /// Config pointing at these tools, rooted at `root`
    pub fn config(&self, root: &Path) -> (IngestConfig, ResolvedPaths) {
        let mut config = IngestConfig::default();
        config.tools.separation_command = self.separation.clone();
        config.tools.separation_format = SeparationFormat::Wav;
        config.tools.ffmpeg_command = self.ffmpeg.clone();
        config.tools.transcriber_command = self.transcriber.clone();
        let paths = config.resolve_paths(Some(root.to_path_buf()));
        (config, paths)
    }
}
