//! services/podcast/src/adapters/merge.rs
//!
//! Joins synthesized segments into one podcast file.
//! It implements the `AudioMerger` port from the `core` crate.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavWriter};
use podcast_core::ports::{AudioMerger, PortError, PortResult};
use tracing::{info, warn};

/// Merges segment files on disk.
///
/// A `.wav` output is rebuilt sample by sample so the result has a single
/// valid header. Every other format (mp3, ogg, raw pcm) is concatenated byte
/// for byte, which players accept for these stream formats.
#[derive(Debug, Clone, Default)]
pub struct FileAudioMerger;

impl FileAudioMerger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioMerger for FileAudioMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> PortResult<()> {
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || merge_files(&inputs, &output))
            .await
            .map_err(|e| PortError::Unexpected(format!("Merge task failed: {}", e)))?
    }
}

fn merge_files(inputs: &[PathBuf], output: &Path) -> PortResult<()> {
    let present: Vec<&PathBuf> = inputs
        .iter()
        .filter(|path| {
            let exists = path.is_file();
            if !exists {
                warn!(path = %path.display(), "Segment missing, skipping it in the merge");
            }
            exists
        })
        .collect();

    if present.is_empty() {
        return Err(PortError::NotFound(format!(
            "none of the {} segments for {} exist",
            inputs.len(),
            output.display()
        )));
    }

    let is_wav = output
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        merge_wav(&present, output)?;
    } else {
        append_bytes(&present, output).map_err(|e| io_error(output, e))?;
    }

    info!(segments = present.len(), output = %output.display(), "Audio merged");
    Ok(())
}

fn append_bytes(inputs: &[&PathBuf], output: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(output)?);
    for path in inputs {
        io::copy(&mut File::open(path)?, &mut writer)?;
    }
    writer.flush()
}

/// Writes every input's samples under the first input's WAV spec.
fn merge_wav(inputs: &[&PathBuf], output: &Path) -> PortResult<()> {
    let open = |path: &Path| WavReader::open(path).map_err(|e| wav_error(path, e));

    let Some(first) = inputs.first() else {
        return Ok(());
    };
    let spec = open(first)?.spec();
    let mut writer = WavWriter::create(output, spec).map_err(|e| wav_error(output, e))?;

    for path in inputs {
        let mut reader: WavReader<BufReader<File>> = open(path)?;
        if reader.spec() != spec {
            return Err(PortError::Unsupported(format!(
                "{} is {:?}, expected {:?}",
                path.display(),
                reader.spec(),
                spec
            )));
        }
        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer
                        .write_sample(sample.map_err(|e| wav_error(path, e))?)
                        .map_err(|e| wav_error(output, e))?;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer
                        .write_sample(sample.map_err(|e| wav_error(path, e))?)
                        .map_err(|e| wav_error(output, e))?;
                }
            }
        }
    }

    writer.finalize().map_err(|e| wav_error(output, e))
}

fn io_error(path: &Path, e: io::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", path.display(), e))
}

fn wav_error(path: &Path, e: hound::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", path.display(), e))
}
