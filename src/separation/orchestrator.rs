//! Separation run: decode, plan, separate per segment, reconstruct, write.
//!
//! A run executes on one worker thread and reports through a single ordered
//! event channel, so log lines and progress updates arrive in the order they
//! happened. Cancellation is a shared flag checked before every segment and
//! before every stem write.

use crate::audio::wav::{self, PcmBuffer, WavFormat};
use crate::defaults;
use crate::error::{ErrorKind, Result, StemwerkError};
use crate::separation::chunk_plan::{self, ChunkPlan, ChunkPolicy};
use crate::separation::overlap_add::OverlapAdd;
use crate::separation::separator::StemSeparator;
use crate::sink::OutputSink;
use crate::stems::{self, Stem};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Progress checkpoints, in percent.
const PROGRESS_READ: u8 = 2;
const PROGRESS_DECODED: u8 = 5;
const PROGRESS_PLANNED: u8 = 8;
const PROGRESS_INFERENCE_START: u8 = 10;
const PROGRESS_INFERENCE_END: u8 = 80;
const PROGRESS_WRITE_END: u8 = 99;

/// Where the input WAV comes from.
pub enum InputAudio {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// Any stream, e.g. stdin
    Reader(Box<dyn Read + Send>),
}

impl InputAudio {
    fn describe(&self) -> String {
        match self {
            InputAudio::Path(path) => path.display().to_string(),
            InputAudio::Bytes(bytes) => format!("{} bytes in memory", bytes.len()),
            InputAudio::Reader(_) => "stream".to_string(),
        }
    }

    fn read_all(self) -> Result<Vec<u8>> {
        match self {
            InputAudio::Path(path) => Ok(std::fs::read(&path)?),
            InputAudio::Bytes(bytes) => Ok(bytes),
            InputAudio::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl fmt::Debug for InputAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputAudio({})", self.describe())
    }
}

/// One separation job.
pub struct RunRequest {
    pub input: InputAudio,
    pub stem_count: u32,
    /// Stem names as given by the caller; normalized by the run
    pub selected_stems: Vec<String>,
    pub sink: Arc<dyn OutputSink>,
}

impl RunRequest {
    pub fn new(
        input: InputAudio,
        stem_count: u32,
        selected_stems: Vec<String>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            input,
            stem_count,
            selected_stems,
            sink,
        }
    }

    /// Request every stem of the vocabulary for `stem_count`.
    pub fn all_stems(input: InputAudio, stem_count: u32, sink: Arc<dyn OutputSink>) -> Self {
        let selected = stems::vocabulary(stem_count)
            .map(|vocab| vocab.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        Self::new(input, stem_count, selected, sink)
    }
}

/// Phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ReadingInput,
    Decoding,
    ChunkPlanning,
    /// Separating segment `index` (0-based) of `count`
    Inference { index: usize, count: usize },
    Writing(Stem),
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::ReadingInput => write!(f, "Reading input"),
            RunState::Decoding => write!(f, "Decoding"),
            RunState::ChunkPlanning => write!(f, "Planning segments"),
            RunState::Inference { index, count } => {
                write!(f, "Separating segment {}/{}", index + 1, count)
            }
            RunState::Writing(stem) => write!(f, "Writing {}", stem.file_name()),
            RunState::Completed => write!(f, "Completed"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

/// Failure summary carried by [`RunEvent::Finished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StemwerkError> for RunFailure {
    fn from(e: &StemwerkError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// One written stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemOutput {
    pub stem: Stem,
    pub name: String,
    /// Encoded size in bytes, header included
    pub bytes: u64,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Format shared by every output stem
    pub format: WavFormat,
    pub plan: ChunkPlan,
    /// Written stems, in vocabulary order
    pub outputs: Vec<StemOutput>,
    pub model: String,
    pub location: String,
}

/// Notifications from a running separation, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Log(String),
    /// Percent complete; never decreases, 100 only on success
    Progress(u8),
    /// Terminal event, sent exactly once
    Finished(std::result::Result<RunReport, RunFailure>),
}

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrchestratorConfig {
    pub policy: ChunkPolicy,
}

/// Handle to a run started with [`SeparationOrchestrator::start`].
pub struct RunHandle {
    events: Receiver<RunEvent>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<RunReport>>>,
}

impl RunHandle {
    /// Event stream of the run. Ends after [`RunEvent::Finished`].
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Ask the run to stop at the next segment or stem boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Shared cancellation flag, e.g. for a Ctrl-C handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Block until the worker exits and return its result.
    pub fn wait(mut self) -> Result<RunReport> {
        let handle = self
            .thread
            .take()
            .ok_or_else(|| StemwerkError::Other("run already joined".to_string()))?;
        match handle.join() {
            Ok(result) => result,
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic");
                Err(StemwerkError::Other(format!("separation worker panicked: {msg}")))
            }
        }
    }
}

/// Emits ordered log and progress events for one run.
struct Reporter {
    tx: Sender<RunEvent>,
    progress: u8,
    state: RunState,
}

impl Reporter {
    fn new(tx: Sender<RunEvent>) -> Self {
        Self {
            tx,
            progress: 0,
            state: RunState::Idle,
        }
    }

    fn send(&self, event: RunEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("run event receiver dropped");
        }
    }

    fn log(&self, message: String) {
        log::info!("{}", message);
        self.send(RunEvent::Log(message));
    }

    fn enter(&mut self, state: RunState, progress: u8) {
        self.state = state;
        self.log(state.to_string());
        self.progress(progress);
    }

    /// Send a progress update for every step. Progress never moves
    /// backwards and 100 is reserved for completion.
    fn progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(PROGRESS_WRITE_END));
        self.send(RunEvent::Progress(self.progress));
    }

    fn complete(&mut self, report: &RunReport) {
        self.state = RunState::Completed;
        self.log(format!(
            "Completed: {} stem(s) written to {}",
            report.outputs.len(),
            report.location
        ));
        self.progress = 100;
        self.send(RunEvent::Progress(100));
        self.send(RunEvent::Finished(Ok(report.clone())));
    }

    /// Report a failure. Progress stays where it was.
    fn fail(&mut self, error: &StemwerkError) {
        log::warn!("Run failed during {}: {}", self.state, error);
        self.state = RunState::Failed;
        self.send(RunEvent::Log(format!("Failed: {}", error)));
        self.send(RunEvent::Finished(Err(RunFailure::from(error))));
    }
}

/// Progress after finishing `done` of `count` steps between `from` and `to`.
fn interpolate(from: u8, to: u8, done: usize, count: usize) -> u8 {
    if count == 0 {
        return to;
    }
    let span = (to - from) as usize;
    from + (span * done / count) as u8
}

/// Sequences one separation run.
pub struct SeparationOrchestrator {
    config: OrchestratorConfig,
    separator: Arc<dyn StemSeparator>,
}

impl SeparationOrchestrator {
    pub fn new(config: OrchestratorConfig, separator: Arc<dyn StemSeparator>) -> Self {
        Self { config, separator }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run on a new worker thread.
    pub fn start(&self, request: RunRequest) -> RunHandle {
        let (tx, rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));

        let worker = SeparationOrchestrator {
            config: self.config,
            separator: Arc::clone(&self.separator),
        };
        let worker_cancel = Arc::clone(&cancel);
        let thread = thread::spawn(move || worker.run(request, &worker_cancel, tx));

        RunHandle {
            events: rx,
            cancel,
            thread: Some(thread),
        }
    }

    /// Run on the calling thread, reporting through `events`.
    ///
    /// Always ends with exactly one [`RunEvent::Finished`]. On failure one
    /// `"Failed: ..."` log line precedes it.
    pub fn run(
        &self,
        request: RunRequest,
        cancel: &AtomicBool,
        events: Sender<RunEvent>,
    ) -> Result<RunReport> {
        let mut reporter = Reporter::new(events);
        match self.execute(request, cancel, &mut reporter) {
            Ok(report) => {
                reporter.complete(&report);
                Ok(report)
            }
            Err(e) => {
                reporter.fail(&e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        request: RunRequest,
        cancel: &AtomicBool,
        reporter: &mut Reporter,
    ) -> Result<RunReport> {
        let RunRequest {
            input,
            stem_count,
            selected_stems,
            sink,
        } = request;

        // Selection is validated before any input is touched
        let selected = stems::select(stem_count, &selected_stems)?;
        reporter.log(format!(
            "Separating into {} stems with {}; writing {} to {}",
            stem_count,
            self.separator.model_name(),
            stems::describe(&selected),
            sink.location()
        ));

        reporter.enter(RunState::ReadingInput, PROGRESS_READ);
        let source = input.describe();
        let bytes = input.read_all()?;
        reporter.log(format!("Read {} bytes from {}", bytes.len(), source));

        reporter.enter(RunState::Decoding, PROGRESS_DECODED);
        let (format, pcm) = wav::decode(&bytes)?;
        drop(bytes);
        reporter.log(format!(
            "Input: {} Hz, {} channel(s), {:.2}s",
            format.sample_rate,
            format.channel_count,
            format.duration_secs()
        ));

        reporter.enter(RunState::ChunkPlanning, PROGRESS_PLANNED);
        let total_frames = format.frames();
        let plan = chunk_plan::plan(total_frames as u64, format.sample_rate, self.config.policy)?;
        reporter.log(format!(
            "{} segment(s) of {}s with {}s overlap",
            plan.len(),
            plan.segment_secs,
            plan.overlap_secs
        ));

        let channels = format.channel_count;
        let samples = pcm.to_samples();
        drop(pcm);
        let mut ola = OverlapAdd::new(selected.len(), total_frames, channels);

        for segment in &plan.segments {
            check_cancelled(cancel)?;
            reporter.enter(
                RunState::Inference {
                    index: segment.index,
                    count: plan.len(),
                },
                interpolate(
                    PROGRESS_INFERENCE_START,
                    PROGRESS_INFERENCE_END,
                    segment.index,
                    plan.len(),
                ),
            );

            let start = segment.start_frame as usize * channels as usize;
            let end = segment.end_frame() as usize * channels as usize;
            let outputs = self
                .separator
                .separate(&samples[start..end], channels, format.sample_rate, &selected)
                .map_err(|e| match e {
                    StemwerkError::Inference { .. } | StemwerkError::Cancelled => e,
                    other => StemwerkError::Inference {
                        segment: segment.index,
                        message: other.to_string(),
                    },
                })?;
            ola.add(&plan, segment, &outputs)?;
            reporter.progress(interpolate(
                PROGRESS_INFERENCE_START,
                PROGRESS_INFERENCE_END,
                segment.index + 1,
                plan.len(),
            ));
        }
        drop(samples);

        let stem_audio = ola.finish();
        let out_format = WavFormat::canonical(
            format.sample_rate,
            channels,
            total_frames * format.block_align(),
        );

        let mut outputs = Vec::with_capacity(selected.len());
        for (i, (stem, audio)) in selected.iter().zip(stem_audio).enumerate() {
            check_cancelled(cancel)?;
            reporter.enter(
                RunState::Writing(*stem),
                interpolate(PROGRESS_INFERENCE_END, PROGRESS_WRITE_END, i, selected.len()),
            );
            let name = stem.file_name();
            let pcm = PcmBuffer::from_samples(&audio);
            write_stem(sink.as_ref(), &name, &out_format, &pcm)?;
            outputs.push(StemOutput {
                stem: *stem,
                name,
                bytes: (wav::CANONICAL_HEADER_LEN + pcm.len()) as u64,
            });
            reporter.progress(interpolate(
                PROGRESS_INFERENCE_END,
                PROGRESS_WRITE_END,
                i + 1,
                selected.len(),
            ));
        }

        Ok(RunReport {
            format: out_format,
            plan,
            outputs,
            model: self.separator.model_name().to_string(),
            location: sink.location(),
        })
    }
}

fn check_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        return Err(StemwerkError::Cancelled);
    }
    Ok(())
}

fn write_stem(sink: &dyn OutputSink, name: &str, format: &WavFormat, pcm: &PcmBuffer) -> Result<()> {
    let mut writer = sink.open(name, defaults::WAV_MIME)?;
    wav::encode_to(&mut writer, format, pcm).map_err(|e| match e {
        StemwerkError::Io(io) => StemwerkError::SinkWrite {
            name: name.to_string(),
            message: io.to_string(),
        },
        other => other,
    })?;
    writer.finish()
}
