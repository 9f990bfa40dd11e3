//! services/podcast/src/batch.rs
//!
//! The batch driver: turns each script into per-line audio segments and one
//! merged podcast file.
//!
//! Output layout for `episode.md`:
//!
//! ```text
//! OUTPUT/episode/segment_000_S_fN2KaTPI1.mp3
//! OUTPUT/episode/segment_001_zh_male_taocheng_uranus_bigtts.mp3
//! OUTPUT/episode/podcast_complete_1718000000.mp3
//! ```
//!
//! Segment files that already exist are reused, so an interrupted run can be
//! resumed by running it again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use podcast_core::ports::{AudioMerger, DialogueSource, PortError, TextToSpeechService};
use podcast_core::{AudioParams, ProsodyOverrides, SynthesisRequest};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::adapters::SCRIPT_EXTENSIONS;
use crate::voices::VoiceBook;

//=========================================================================================
// Options and Reports
//=========================================================================================

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub audio: AudioParams,
    /// Prosody for voices without a profile in the voice book.
    pub prosody: ProsodyOverrides,
    /// Segments synthesized at the same time within one script.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Merged(PathBuf),
    /// Every segment failed or was skipped, so nothing was merged.
    NoAudio,
    Failed(String),
    Cancelled,
}

/// What happened to one script.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub input: PathBuf,
    pub lines: usize,
    pub synthesized: usize,
    pub reused: usize,
    pub failed: usize,
    /// Lines skipped because their speaker had no voice and no default voice was left to assign.
    pub unmapped: usize,
    pub outcome: FileOutcome,
}

impl FileReport {
    fn new(input: &Path, lines: usize) -> Self {
        Self {
            input: input.to_path_buf(),
            lines,
            synthesized: 0,
            reused: 0,
            failed: 0,
            unmapped: 0,
            outcome: FileOutcome::NoAudio,
        }
    }
}

struct Segment {
    index: usize,
    voice: String,
    text: String,
    path: PathBuf,
}

enum SegmentResult {
    Synthesized(PathBuf),
    Reused(PathBuf),
    Failed,
}

//=========================================================================================
// The Runner
//=========================================================================================

pub struct BatchRunner {
    tts: Arc<dyn TextToSpeechService>,
    source: Arc<dyn DialogueSource>,
    merger: Arc<dyn AudioMerger>,
    voices: VoiceBook,
    options: BatchOptions,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        tts: Arc<dyn TextToSpeechService>,
        source: Arc<dyn DialogueSource>,
        merger: Arc<dyn AudioMerger>,
        voices: VoiceBook,
        options: BatchOptions,
    ) -> Self {
        Self {
            tts,
            source,
            merger,
            voices,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that stops the run when cancelled. In-flight syntheses are dropped.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Processes every script in order. A failing script does not stop the run.
    pub async fn run(&self, inputs: &[PathBuf]) -> Vec<FileReport> {
        let mut reports = Vec::with_capacity(inputs.len());
        for (n, input) in inputs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(remaining = inputs.len() - n, "Batch cancelled; remaining scripts skipped");
                break;
            }
            info!(file = %input.display(), "[{}/{}] Processing script", n + 1, inputs.len());

            let report = match self.process_file(input).await {
                Ok(report) => report,
                Err(e) => {
                    error!(file = %input.display(), error = %e, "Script failed");
                    let mut report = FileReport::new(input, 0);
                    report.outcome = FileOutcome::Failed(e.to_string());
                    report
                }
            };
            reports.push(report);
        }
        reports
    }

    pub async fn process_file(&self, input: &Path) -> Result<FileReport, AppError> {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Internal(format!("{} has no file name", input.display())))?;

        let lines = self.source.load_dialogue(input).await?;
        info!(lines = lines.len(), "Script parsed");

        let out_dir = self.options.output_dir.join(stem);
        tokio::fs::create_dir_all(&out_dir).await?;

        let mut report = FileReport::new(input, lines.len());
        let ext = self.options.audio.format.extension();
        let mut cast = self.voices.cast();
        let mut segments = Vec::with_capacity(lines.len());
        for (index, line) in lines.into_iter().enumerate() {
            let Some(voice) = cast.voice_for(&line.speaker) else {
                warn!(speaker = %line.speaker, index, "No voice for speaker and no default voices; skipping line");
                report.unmapped += 1;
                continue;
            };
            segments.push(Segment {
                index,
                path: out_dir.join(format!("segment_{:03}_{}.{}", index, sanitize(&voice), ext)),
                voice,
                text: line.text,
            });
        }

        let total = report.lines;
        let mut results = stream::iter(segments)
            .map(|segment| self.render_segment(segment, total))
            .buffered(self.options.concurrency.max(1));

        let mut files = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(file = %input.display(), "Cancelled; in-flight segments dropped");
                    report.outcome = FileOutcome::Cancelled;
                    return Ok(report);
                }
                next = results.next() => next,
            };
            match next {
                Some(SegmentResult::Synthesized(path)) => {
                    report.synthesized += 1;
                    files.push(path);
                }
                Some(SegmentResult::Reused(path)) => {
                    report.reused += 1;
                    files.push(path);
                }
                Some(SegmentResult::Failed) => report.failed += 1,
                None => break,
            }
        }

        if files.is_empty() {
            error!(file = %input.display(), "No audio segments; skipping merge");
            return Ok(report);
        }

        let final_path = out_dir.join(format!(
            "podcast_complete_{}.{}",
            chrono::Utc::now().timestamp(),
            ext
        ));
        report.outcome = match self.merger.merge(&files, &final_path).await {
            Ok(()) => {
                let size = tokio::fs::metadata(&final_path).await.map(|m| m.len()).unwrap_or(0);
                info!(
                    output = %final_path.display(),
                    size_mb = %format!("{:.2}", size as f64 / (1024.0 * 1024.0)),
                    "Podcast complete"
                );
                FileOutcome::Merged(final_path)
            }
            Err(e) => {
                error!(file = %input.display(), error = %e, "Merge failed");
                FileOutcome::Failed(e.to_string())
            }
        };
        Ok(report)
    }

    async fn render_segment(&self, segment: Segment, total: usize) -> SegmentResult {
        match tokio::fs::try_exists(&segment.path).await {
            Ok(true) => {
                info!(segment = segment.index, path = %segment.path.display(), "Segment exists, reusing it");
                return SegmentResult::Reused(segment.path);
            }
            Ok(false) => {}
            Err(e) => warn!(path = %segment.path.display(), error = %e, "Could not check for an existing segment"),
        }

        let prosody = self.voices.prosody_for(&segment.voice, &self.options.prosody);
        let request = SynthesisRequest::new(segment.text, segment.voice, self.options.audio).with_prosody(prosody);
        info!(
            segment = segment.index + 1,
            total,
            voice = %request.voice_type,
            resource_id = %request.resource_id,
            "Synthesizing segment"
        );

        let audio = match self.tts.synthesize(&request).await {
            Ok(audio) => audio,
            Err(e) => {
                error!(segment = segment.index, error = %e, "TTS failed; skipping segment");
                return SegmentResult::Failed;
            }
        };

        match write_segment(&segment.path, &audio).await {
            Ok(()) => SegmentResult::Synthesized(segment.path),
            Err(e) => {
                error!(path = %segment.path.display(), error = %e, "Could not write segment");
                SegmentResult::Failed
            }
        }
    }
}

/// Writes through a `.part` file so an interrupted write is never reused as a finished segment.
async fn write_segment(path: &Path, audio: &[u8]) -> std::io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, audio).await?;
    tokio::fs::rename(&partial, path).await
}

/// Keeps the characters that are safe in a file name.
fn sanitize(voice: &str) -> String {
    voice
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Expands the command-line input into the scripts to process.
///
/// A file is used as is; a directory contributes its `.md`/`.markdown`/`.docx` files, sorted by name.
pub fn discover_inputs(input: &Path) -> Result<Vec<PathBuf>, AppError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(PortError::NotFound(input.display().to_string()).into());
    }

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(input)? {
        let path = entry?.path();
        let is_script = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCRIPT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)));
        if is_script && path.is_file() {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileAudioMerger;
    use async_trait::async_trait;
    use podcast_core::ports::PortResult;
    use podcast_core::{DialogueLine, RESOURCE_SEED_ICL, RESOURCE_SEED_TTS};
    use std::sync::Mutex;
    use std::time::Duration;

    //=====================================================================================
    // Fakes
    //=====================================================================================

    #[derive(Default)]
    struct FakeTts {
        calls: Mutex<Vec<SynthesisRequest>>,
        failing_text: Option<&'static str>,
        slow_text: Option<&'static str>,
    }

    #[async_trait]
    impl TextToSpeechService for FakeTts {
        async fn synthesize(&self, request: &SynthesisRequest) -> PortResult<Vec<u8>> {
            self.calls.lock().unwrap().push(request.clone());
            if self.slow_text == Some(request.text.as_str()) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if self.failing_text == Some(request.text.as_str()) {
                return Err(PortError::Rejected("speaker not authorized".to_string()));
            }
            Ok(format!("<{}>", request.text).into_bytes())
        }
    }

    struct FakeSource {
        lines: Vec<DialogueLine>,
    }

    #[async_trait]
    impl DialogueSource for FakeSource {
        async fn load_dialogue(&self, path: &Path) -> PortResult<Vec<DialogueLine>> {
            if path.extension().is_some_and(|ext| ext == "docx") {
                return Err(PortError::Unsupported(path.display().to_string()));
            }
            Ok(self.lines.clone())
        }
    }

    fn line(speaker: &str, text: &str) -> DialogueLine {
        DialogueLine {
            speaker: speaker.to_string(),
            text: text.to_string(),
        }
    }

    fn script() -> Vec<DialogueLine> {
        vec![line("A", "one"), line("Narrator", "skip me"), line("B", "two")]
    }

    const VOICES: &str = r#"{
        "speakers": { "A": "S_voiceA", "B": "zh_voice/b" },
        "profiles": { "S_voiceA": { "speech_rate": 30 } },
        "default_voices": []
    }"#;

    const ROTATING_VOICES: &str = r#"{
        "speakers": { "A": "S_voiceA", "B": "zh_voice/b" },
        "default_voices": ["zh_default_one", "zh_default_two"]
    }"#;

    struct Fixture {
        dir: tempfile::TempDir,
        tts: Arc<FakeTts>,
        runner: BatchRunner,
    }

    impl Fixture {
        fn input(&self) -> PathBuf {
            self.dir.path().join("episode.md")
        }

        fn episode_dir(&self) -> PathBuf {
            self.dir.path().join("out").join("episode")
        }

        fn calls(&self) -> Vec<SynthesisRequest> {
            self.tts.calls.lock().unwrap().clone()
        }
    }

    fn fixture(tts: FakeTts, lines: Vec<DialogueLine>, concurrency: usize) -> Fixture {
        fixture_with_voices(tts, lines, concurrency, VOICES)
    }

    fn fixture_with_voices(tts: FakeTts, lines: Vec<DialogueLine>, concurrency: usize, voices: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tts = Arc::new(tts);
        let runner = BatchRunner::new(
            tts.clone(),
            Arc::new(FakeSource { lines }),
            Arc::new(FileAudioMerger::new()),
            VoiceBook::from_json(voices).unwrap(),
            BatchOptions {
                output_dir: dir.path().join("out"),
                audio: AudioParams::default(),
                prosody: ProsodyOverrides {
                    pitch_rate: 5,
                    ..Default::default()
                },
                concurrency,
            },
        );
        Fixture { dir, tts, runner }
    }

    fn merged(report: &FileReport) -> Vec<u8> {
        match &report.outcome {
            FileOutcome::Merged(path) => std::fs::read(path).unwrap(),
            other => panic!("expected a merged podcast, got {other:?}"),
        }
    }

    //=====================================================================================
    // Tests
    //=====================================================================================

    #[tokio::test]
    async fn synthesizes_mapped_lines_and_merges_in_order() {
        let f = fixture(FakeTts::default(), script(), 1);

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.lines, 3);
        assert_eq!(report.synthesized, 2);
        assert_eq!(report.unmapped, 1);
        assert_eq!(merged(&report), b"<one><two>");
        assert!(f.episode_dir().join("segment_000_S_voiceA.mp3").is_file());
        assert!(f.episode_dir().join("segment_002_zh_voiceb.mp3").is_file());

        let FileOutcome::Merged(path) = &report.outcome else { unreachable!() };
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("podcast_complete_") && name.ends_with(".mp3"));

        let calls = f.calls();
        assert_eq!(calls[0].resource_id, RESOURCE_SEED_ICL);
        assert_eq!(calls[1].resource_id, RESOURCE_SEED_TTS);
    }

    #[tokio::test]
    async fn unmapped_speakers_are_voiced_from_the_default_rotation() {
        let lines = vec![
            line("A", "one"),
            line("Narrator", "two"),
            line("Guest", "three"),
            line("Narrator", "four"),
        ];
        let f = fixture_with_voices(FakeTts::default(), lines, 1, ROTATING_VOICES);

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.synthesized, 4);
        assert_eq!(report.unmapped, 0);
        assert_eq!(merged(&report), b"<one><two><three><four>");

        let voices: Vec<_> = f.calls().into_iter().map(|c| c.voice_type).collect();
        assert_eq!(voices, vec!["S_voiceA", "zh_default_one", "zh_default_two", "zh_default_one"]);
        assert!(f.episode_dir().join("segment_001_zh_default_one.mp3").is_file());
        assert_eq!(f.calls()[1].resource_id, RESOURCE_SEED_TTS);
    }

    #[tokio::test]
    async fn voice_profiles_replace_default_prosody() {
        let f = fixture(FakeTts::default(), script(), 1);
        f.runner.process_file(&f.input()).await.unwrap();

        let calls = f.calls();
        assert_eq!(calls[0].prosody.speech_rate, 30);
        assert_eq!(calls[0].prosody.pitch_rate, 0);
        assert_eq!(calls[1].prosody.speech_rate, 0);
        assert_eq!(calls[1].prosody.pitch_rate, 5);
    }

    #[tokio::test]
    async fn existing_segments_are_reused() {
        let f = fixture(FakeTts::default(), script(), 1);
        std::fs::create_dir_all(f.episode_dir()).unwrap();
        std::fs::write(f.episode_dir().join("segment_000_S_voiceA.mp3"), b"cached").unwrap();

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.reused, 1);
        assert_eq!(report.synthesized, 1);
        assert_eq!(f.calls().len(), 1);
        assert_eq!(merged(&report), b"cached<two>");
    }

    #[tokio::test]
    async fn failed_segments_are_skipped() {
        let tts = FakeTts {
            failing_text: Some("one"),
            ..Default::default()
        };
        let f = fixture(tts, script(), 1);

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(merged(&report), b"<two>");
        assert!(!f.episode_dir().join("segment_000_S_voiceA.mp3").exists());
    }

    #[tokio::test]
    async fn no_audio_means_no_merge() {
        let tts = FakeTts {
            failing_text: Some("one"),
            ..Default::default()
        };
        let f = fixture(tts, vec![line("A", "one"), line("Nobody", "two")], 1);

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.outcome, FileOutcome::NoAudio);
        let leftovers: Vec<_> = std::fs::read_dir(f.episode_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn concurrent_synthesis_keeps_dialogue_order() {
        let tts = FakeTts {
            slow_text: Some("one"),
            ..Default::default()
        };
        let lines = vec![line("A", "one"), line("B", "two"), line("A", "three"), line("B", "four")];
        let f = fixture(tts, lines, 3);

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.synthesized, 4);
        assert_eq!(merged(&report), b"<one><two><three><four>");
    }

    #[tokio::test]
    async fn cancelled_file_is_not_merged() {
        let f = fixture(FakeTts::default(), script(), 1);
        f.runner.cancellation_token().cancel();

        let report = f.runner.process_file(&f.input()).await.unwrap();

        assert_eq!(report.outcome, FileOutcome::Cancelled);
        assert!(f.calls().is_empty());
        assert!(f.runner.run(&[f.input()]).await.is_empty());
    }

    #[tokio::test]
    async fn failing_scripts_do_not_stop_the_run() {
        let f = fixture(FakeTts::default(), script(), 1);
        let inputs = vec![f.dir.path().join("draft.docx"), f.input()];

        let reports = f.runner.run(&inputs).await;

        assert_eq!(reports.len(), 2);
        assert!(matches!(&reports[0].outcome, FileOutcome::Failed(msg) if msg.contains("draft.docx")));
        assert!(matches!(reports[1].outcome, FileOutcome::Merged(_)));
    }

    #[test]
    fn voice_ids_are_sanitized_for_file_names() {
        assert_eq!(sanitize("S_fN2KaTPI1"), "S_fN2KaTPI1");
        assert_eq!(sanitize("zh/../voice v2"), "zh..voicev2");
        assert_eq!(sanitize("saturn_zh-female.v2"), "saturn_zh-female.v2");
    }

    #[test]
    fn directories_expand_to_sorted_scripts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.md", "a.markdown", "notes.txt", "C.MD", "draft.DOCX"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.md")).unwrap();

        let found = discover_inputs(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["C.MD", "a.markdown", "b.md", "draft.DOCX"]);

        let single = dir.path().join("notes.txt");
        assert_eq!(discover_inputs(&single).unwrap(), vec![single.clone()]);
        assert!(discover_inputs(&dir.path().join("missing")).is_err());
    }
}
