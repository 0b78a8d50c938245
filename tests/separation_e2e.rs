use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stemwerk::error::{ErrorKind, StemwerkError};
use stemwerk::separation::{
    ChunkPolicy, InputAudio, MockSeparator, OrchestratorConfig, PassthroughSeparator, RunEvent,
    RunRequest, SeparationOrchestrator, StemSeparator,
};
use stemwerk::sink::{DirectorySink, MemoryTree, OutputSink, TreeSink};
use stemwerk::stems::Stem;
use tempfile::TempDir;

const RATE: u32 = 44100;

/// Write one sine per channel with hound and return the interleaved samples.
fn write_fixture(path: &Path, seconds: u32, channels: u16) -> Vec<i16> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (RATE * seconds) as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        let t = frame as f32 / RATE as f32;
        for ch in 0..channels {
            let freq = 220.0 * (ch as f32 + 1.0);
            let sample = ((t * freq * std::f32::consts::TAU).sin() * 12000.0) as i16;
            samples.push(sample);
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
    samples
}

fn read_wav(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

fn orchestrator(
    separator: impl StemSeparator + 'static,
    policy: ChunkPolicy,
) -> SeparationOrchestrator {
    SeparationOrchestrator::new(OrchestratorConfig { policy }, Arc::new(separator))
}

fn run(
    orchestrator: &SeparationOrchestrator,
    request: RunRequest,
) -> (stemwerk::Result<stemwerk::RunReport>, Vec<RunEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let cancel = AtomicBool::new(false);
    let result = orchestrator.run(request, &cancel, tx);
    (result, rx.try_iter().collect())
}

fn progress(events: &[RunEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn directory_sink(dir: &Path) -> Arc<dyn OutputSink> {
    Arc::new(DirectorySink::create(dir).unwrap())
}

#[test]
fn four_stem_run_reconstructs_input_in_every_stem() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    let samples = write_fixture(&input, 5, 2);
    let out = tmp.path().join("song_stems");

    let orchestrator = orchestrator(PassthroughSeparator::new(), ChunkPolicy::new(2.0, 0.5));
    let request = RunRequest::all_stems(InputAudio::Path(input), 4, directory_sink(&out));
    let (result, events) = run(&orchestrator, request);
    let report = result.unwrap();

    // 5s with 2s segments hopping 1.5s
    assert_eq!(report.plan.len(), 3);
    assert_eq!(report.format.sample_rate, RATE);
    assert_eq!(report.format.channel_count, 2);
    assert_eq!(
        files_in(&out),
        vec!["bass.wav", "drums.wav", "other.wav", "vocals.wav"]
    );

    for output in &report.outputs {
        let (spec, written) = read_wav(&out.join(&output.name));
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(written.len(), samples.len(), "{} length", output.name);
        assert_eq!(written, samples, "{} content", output.name);
    }

    let values = progress(&events);
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
    assert_eq!(values.last(), Some(&100));
    assert_eq!(values.iter().filter(|p| **p == 100).count(), 1);
}

#[test]
fn vocals_only_selection_writes_one_file() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    write_fixture(&input, 1, 2);
    let out = tmp.path().join("out");

    let orchestrator = orchestrator(MockSeparator::new("mock"), ChunkPolicy::default());
    let request = RunRequest::new(
        InputAudio::Path(input),
        4,
        vec![" VOCALS ".to_string(), "vocals".to_string(), "piano".to_string()],
        directory_sink(&out),
    );
    let (result, _) = run(&orchestrator, request);
    let report = result.unwrap();

    assert_eq!(report.outputs.len(), 1);
    assert_eq!(report.outputs[0].stem, Stem::Vocals);
    assert_eq!(files_in(&out), vec!["vocals.wav"]);

    // Only the requested stem is asked of the separator
    let (_, written) = read_wav(&out.join("vocals.wav"));
    assert!(written.iter().all(|s| *s == 100));
}

#[test]
fn empty_selection_fails_before_input_is_read() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let separator = MockSeparator::new("mock");
    let calls = separator.clone();

    let orchestrator = orchestrator(separator, ChunkPolicy::default());
    let request = RunRequest::new(
        InputAudio::Path(PathBuf::from("/definitely/not/here.wav")),
        2,
        vec!["drums".to_string()],
        directory_sink(&out),
    );
    let (result, events) = run(&orchestrator, request);

    match result {
        Err(StemwerkError::NoStemsSelected { count, valid }) => {
            assert_eq!(count, 2);
            assert_eq!(valid, "vocals, instrumental");
        }
        other => panic!("Expected NoStemsSelected, got {:?}", other),
    }
    assert_eq!(calls.calls(), 0);
    assert!(files_in(&out).is_empty());
    match events.last() {
        Some(RunEvent::Finished(Err(failure))) => assert_eq!(failure.kind, ErrorKind::Config),
        other => panic!("Expected failed Finished event, got {:?}", other),
    }
}

#[test]
fn non_wav_input_fails_with_format_error_and_no_output() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");

    let orchestrator = orchestrator(PassthroughSeparator::new(), ChunkPolicy::default());
    let request = RunRequest::all_stems(
        InputAudio::Bytes(b"ID3\x03\x00\x00\x00 definitely an mp3".to_vec()),
        2,
        directory_sink(&out),
    );
    let (result, events) = run(&orchestrator, request);

    assert!(matches!(result, Err(StemwerkError::MissingRiffHeader)));
    assert!(files_in(&out).is_empty());

    let failures: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Log(line) if line.starts_with("Failed:") => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("RIFF"));
    assert!(!progress(&events).contains(&100));
}

#[test]
fn inference_failure_leaves_previous_outputs_untouched() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    write_fixture(&input, 3, 1);
    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();
    std::fs::write(out.join("vocals.wav"), b"previous run").unwrap();

    let separator = MockSeparator::new("mock").with_fail_on_segment(1);
    let orchestrator = orchestrator(separator, ChunkPolicy::new(1.0, 0.25));
    let request = RunRequest::all_stems(InputAudio::Path(input), 2, directory_sink(&out));
    let (result, events) = run(&orchestrator, request);

    match result {
        Err(StemwerkError::Inference { segment, .. }) => assert_eq!(segment, 1),
        other => panic!("Expected Inference error, got {:?}", other),
    }
    assert_eq!(files_in(&out), vec!["vocals.wav"]);
    assert_eq!(std::fs::read(out.join("vocals.wav")).unwrap(), b"previous run");

    let values = progress(&events);
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    assert!(values.last().is_some_and(|p| *p < 100));
}

/// Raises the cancel flag while separating the first segment.
struct CancellingSeparator {
    cancel: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl StemSeparator for CancellingSeparator {
    fn separate(
        &self,
        segment: &[i16],
        _channels: u16,
        _sample_rate: u32,
        stems: &[Stem],
    ) -> stemwerk::Result<Vec<Vec<i16>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        Ok(vec![segment.to_vec(); stems.len()])
    }

    fn model_name(&self) -> &str {
        "cancelling"
    }
}

#[test]
fn cancellation_stops_at_next_segment_boundary() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    write_fixture(&input, 4, 2);
    let out = tmp.path().join("out");

    let cancel = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(
        CancellingSeparator {
            cancel: Arc::clone(&cancel),
            calls: Arc::clone(&calls),
        },
        ChunkPolicy::new(1.0, 0.1),
    );
    let request = RunRequest::all_stems(InputAudio::Path(input), 2, directory_sink(&out));

    let (tx, rx) = crossbeam_channel::unbounded();
    let result = orchestrator.run(request, &cancel, tx);

    assert!(matches!(result, Err(StemwerkError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(files_in(&out).is_empty());
    let events: Vec<RunEvent> = rx.try_iter().collect();
    match events.last() {
        Some(RunEvent::Finished(Err(failure))) => assert_eq!(failure.kind, ErrorKind::Cancelled),
        other => panic!("Expected cancelled Finished event, got {:?}", other),
    }
}

#[test]
fn rerun_replaces_stems_in_directory() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    write_fixture(&input, 1, 2);
    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();
    std::fs::write(out.join("vocals.wav"), vec![0u8; 10 * 1024 * 1024]).unwrap();

    let orchestrator = orchestrator(MockSeparator::new("mock"), ChunkPolicy::default());
    let request = RunRequest::all_stems(InputAudio::Path(input.clone()), 2, directory_sink(&out));
    let (result, _) = run(&orchestrator, request);
    let report = result.unwrap();

    // The old, larger file is gone, not overwritten in place
    let expected_len = report.outputs[0].bytes;
    assert_eq!(std::fs::metadata(out.join("vocals.wav")).unwrap().len(), expected_len);
    assert_eq!(files_in(&out), vec!["instrumental.wav", "vocals.wav"]);

    let (_, vocals) = read_wav(&out.join("vocals.wav"));
    let (_, instrumental) = read_wav(&out.join("instrumental.wav"));
    assert!(vocals.iter().all(|s| *s == 100));
    assert!(instrumental.iter().all(|s| *s == 200));
}

#[test]
fn tree_sink_replaces_by_recreating() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    let samples = write_fixture(&input, 1, 1);

    let tree = MemoryTree::new();
    tree.insert("vocals.wav", "audio/x-wav", &[1u8; 4096]);
    let sink: Arc<dyn OutputSink> = Arc::new(TreeSink::new(Arc::new(tree.clone())));

    let orchestrator = orchestrator(PassthroughSeparator::new(), ChunkPolicy::default());
    let request = RunRequest::new(
        InputAudio::Path(input),
        2,
        vec!["vocals".to_string()],
        sink,
    );
    let (result, _) = run(&orchestrator, request);
    result.unwrap();

    assert_eq!(tree.names(), vec!["vocals.wav"]);
    assert_eq!(tree.mime_type("vocals.wav").as_deref(), Some("audio/wav"));

    let bytes = tree.read("vocals.wav").unwrap();
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
    let written: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(written, samples);
}

#[test]
fn worker_handle_streams_ordered_events() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("song.wav");
    write_fixture(&input, 2, 2);
    let out = tmp.path().join("out");

    let orchestrator = orchestrator(PassthroughSeparator::new(), ChunkPolicy::new(1.0, 0.2));
    let handle = orchestrator.start(RunRequest::all_stems(
        InputAudio::Path(input),
        2,
        directory_sink(&out),
    ));

    let events: Vec<RunEvent> = handle.events().iter().collect();
    let report = handle.wait().unwrap();
    assert_eq!(report.model, "passthrough");

    let logs: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Log(line) => Some(line.as_str()),
            _ => None,
        })
        .collect();
    let position = |needle: &str| logs.iter().position(|l| *l == needle).unwrap();
    assert!(position("Reading input") < position("Decoding"));
    assert!(position("Decoding") < position("Planning segments"));
    assert!(position("Planning segments") < position("Separating segment 1/3"));
    assert!(position("Separating segment 3/3") < position("Writing vocals.wav"));
    assert!(position("Writing vocals.wav") < position("Writing instrumental.wav"));
    assert!(matches!(events.last(), Some(RunEvent::Finished(Ok(_)))));
}
