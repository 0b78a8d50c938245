//! Terminal rendering of run and download events.
//! Library code only emits events; everything user-facing is drawn here.

#[cfg(feature = "model-download")]
use crate::models::DownloadEvent;
use crate::error::{ErrorKind, StemwerkError};
use crate::separation::{RunEvent, RunReport};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::sync::atomic::{AtomicUsize, Ordering};

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Plain-text line for a run event, or `None` for events that only move
/// the progress bar.
pub fn format_run_event(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::Log(line) => Some(line.clone()),
        RunEvent::Progress(_) => None,
        RunEvent::Finished(Ok(report)) => Some(summarize(report)),
        RunEvent::Finished(Err(failure)) => {
            Some(format!("error [{}]: {}", failure.kind, failure.message))
        }
    }
}

/// One-line summary of a finished run.
pub fn summarize(report: &RunReport) -> String {
    let names: Vec<&str> = report.outputs.iter().map(|o| o.name.as_str()).collect();
    format!(
        "{} stem(s) from {} segment(s) at {} Hz: {}",
        report.outputs.len(),
        report.plan.len(),
        report.format.sample_rate,
        names.join(", ")
    )
}

/// Draws run events on stderr: log lines above a percentage bar.
///
/// Failures are printed even when quiet, whether they end a run or stop
/// the command before a run starts.
pub struct RunRenderer {
    bar: ProgressBar,
    quiet: bool,
    failures: AtomicUsize,
}

impl RunRenderer {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
            bar.set_style(bar_style("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}"));
            bar
        };
        Self {
            bar,
            quiet,
            failures: AtomicUsize::new(0),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Number of failures printed so far.
    pub fn failures_reported(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Print an error that stopped the command.
    pub fn report_error(&self, error: &StemwerkError) {
        self.report_failure(error.kind(), &error.to_string());
    }

    fn report_failure(&self, kind: ErrorKind, message: &str) {
        self.bar.abandon();
        eprintln!("{} [{}] {}", "error:".red().bold(), kind, message);
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn render(&self, event: &RunEvent) {
        match event {
            RunEvent::Progress(percent) => self.bar.set_position(u64::from(*percent)),
            RunEvent::Log(line) => {
                if !self.quiet {
                    self.bar.set_message(line.clone());
                    self.bar.println(format!("{}", line.dimmed()));
                }
            }
            RunEvent::Finished(Ok(report)) => {
                self.bar.finish_and_clear();
                if !self.quiet {
                    eprintln!("{} {}", "done:".green().bold(), summarize(report));
                }
            }
            RunEvent::Finished(Err(failure)) => {
                self.report_failure(failure.kind, &failure.message);
            }
        }
    }
}

/// Draws download progress on stderr.
#[cfg(feature = "model-download")]
pub struct DownloadRenderer {
    bar: Option<ProgressBar>,
    quiet: bool,
}

#[cfg(feature = "model-download")]
impl DownloadRenderer {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    pub fn render(&mut self, event: DownloadEvent) {
        if self.quiet {
            return;
        }
        match event {
            DownloadEvent::Started { file, total_bytes } => {
                match total_bytes {
                    Some(total) => eprintln!("Downloading {} ({} MB)...", file, total / (1024 * 1024)),
                    None => eprintln!("Downloading {}...", file),
                }
                let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
                bar.set_style(bar_style("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% ({elapsed})"));
                self.bar = Some(bar);
            }
            DownloadEvent::Progress { percent, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(u64::from(percent));
                }
            }
            DownloadEvent::Verified { file, downloaded } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                if downloaded {
                    eprintln!("{} {}", "Checksum verified:".green(), file);
                } else {
                    eprintln!("{} {}", "Using cached model:".green(), file);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::WavFormat;
    use crate::separation::{ChunkPolicy, RunFailure, StemOutput, plan};
    use crate::stems::Stem;

    fn report() -> RunReport {
        RunReport {
            format: WavFormat::canonical(44100, 2, 0),
            plan: plan(44100, 44100, ChunkPolicy::default()).unwrap(),
            outputs: vec![
                StemOutput {
                    stem: Stem::Vocals,
                    name: "vocals.wav".to_string(),
                    bytes: 44,
                },
                StemOutput {
                    stem: Stem::Instrumental,
                    name: "instrumental.wav".to_string(),
                    bytes: 44,
                },
            ],
            model: "passthrough".to_string(),
            location: "/tmp/out".to_string(),
        }
    }

    #[test]
    fn summary_lists_outputs() {
        assert_eq!(
            summarize(&report()),
            "2 stem(s) from 1 segment(s) at 44100 Hz: vocals.wav, instrumental.wav"
        );
    }

    #[test]
    fn progress_has_no_text() {
        assert_eq!(format_run_event(&RunEvent::Progress(50)), None);
    }

    #[test]
    fn log_lines_pass_through() {
        assert_eq!(
            format_run_event(&RunEvent::Log("Decoding".to_string())).unwrap(),
            "Decoding"
        );
    }

    #[test]
    fn failure_shows_kind_and_message() {
        let event = RunEvent::Finished(Err(RunFailure {
            kind: ErrorKind::Format,
            message: "Not a WAV file (missing RIFF/WAVE header)".to_string(),
        }));
        assert_eq!(
            format_run_event(&event).unwrap(),
            "error [format]: Not a WAV file (missing RIFF/WAVE header)"
        );
    }

    #[test]
    fn quiet_renderer_accepts_all_events() {
        let renderer = RunRenderer::new(true);
        renderer.render(&RunEvent::Log("Reading input".to_string()));
        renderer.render(&RunEvent::Progress(10));
        renderer.render(&RunEvent::Finished(Ok(report())));
        assert_eq!(renderer.failures_reported(), 0);
    }

    #[test]
    fn failures_are_counted_in_quiet_mode() {
        let renderer = RunRenderer::new(true);
        renderer.render(&RunEvent::Finished(Err(RunFailure {
            kind: ErrorKind::Inference,
            message: "Inference failed on segment 2: boom".to_string(),
        })));
        renderer.report_error(&StemwerkError::UnsupportedStemCount { count: 6 });
        assert_eq!(renderer.failures_reported(), 2);
    }
}
