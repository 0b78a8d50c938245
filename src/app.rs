//! Separation command entry point.
//!
//! Composes the complete flow:
//! acquire model → read input → separate → write stems

use crate::config::Config;
use crate::error::{Result, StemwerkError};
use crate::output::RunRenderer;
use crate::separation::{
    ChunkPolicy, InputAudio, OrchestratorConfig, PassthroughSeparator, RunReport, RunRequest,
    SeparationOrchestrator, StemSeparator,
};
use crate::sink::{DirectorySink, FsTree, OutputSink, TreeSink};
use crate::stems;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[cfg(feature = "model-download")]
use crate::models::{ArtifactStore, FetcherConfig, HttpFetcher, store::default_models_dir};
#[cfg(feature = "model-download")]
use crate::output::DownloadRenderer;

/// Input path that means "read from stdin".
pub const STDIN_INPUT: &str = "-";

/// Options of the separate command, after CLI parsing.
#[derive(Debug, Clone, Default)]
pub struct SeparateOptions {
    pub input: String,
    pub stems: Option<u32>,
    /// Empty means every stem of the vocabulary
    pub select: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub tree: Option<PathBuf>,
    pub no_model: bool,
    pub segment_secs: Option<f64>,
    pub overlap_secs: Option<f64>,
}

/// Build the artifact store described by `config`.
#[cfg(feature = "model-download")]
pub fn artifact_store(config: &Config) -> Result<ArtifactStore> {
    let fetcher = HttpFetcher::new(FetcherConfig {
        connect_timeout: config.models.connect_timeout(),
        request_timeout: config.models.request_timeout(),
        idle_timeout: config.models.idle_timeout(),
    })?;
    let dir = config.models.dir.clone().unwrap_or_else(default_models_dir);
    Ok(ArtifactStore::new(
        Arc::new(fetcher),
        dir,
        &config.models.release_url,
        &config.models.release_tag,
    ))
}

/// Make sure the model for `stem_count` is installed and return the
/// separator to run with it.
///
/// Inference itself runs outside this crate; the separator returned here
/// passes audio through under the verified model's name.
async fn create_separator(
    config: &Config,
    stem_count: u32,
    no_model: bool,
    quiet: bool,
) -> Result<Arc<dyn StemSeparator>> {
    if no_model {
        return Ok(Arc::new(PassthroughSeparator::new()));
    }

    #[cfg(feature = "model-download")]
    {
        let store = artifact_store(config)?;
        let mut renderer = DownloadRenderer::new(quiet);
        let artifact = store
            .ensure_artifact_with(stem_count, &mut |event| renderer.render(event))
            .await?;
        log::info!("Model {} at {}", artifact.entry.id, artifact.path.display());
        Ok(Arc::new(PassthroughSeparator::for_model(&artifact.entry.id)))
    }

    #[cfg(not(feature = "model-download"))]
    {
        let _ = (config, stem_count);
        if !quiet {
            eprintln!("stemwerk: built without model download, using passthrough separator");
        }
        Ok(Arc::new(PassthroughSeparator::new()))
    }
}

/// Default output directory for `input`: `<config output dir or .>/<stem>_stems`.
pub fn default_output_dir(config: &Config, input: &str) -> PathBuf {
    let base = config
        .output
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    if input == STDIN_INPUT {
        return base.join("stems");
    }
    let stem = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    base.join(format!("{stem}_stems"))
}

fn create_sink(config: &Config, opts: &SeparateOptions) -> Result<Arc<dyn OutputSink>> {
    if let Some(root) = &opts.tree {
        std::fs::create_dir_all(root).map_err(|e| StemwerkError::SinkCreateFailed {
            name: root.display().to_string(),
            message: e.to_string(),
        })?;
        return Ok(Arc::new(TreeSink::new(Arc::new(FsTree::new(root)))));
    }
    let dir = opts
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(config, &opts.input));
    Ok(Arc::new(DirectorySink::create(dir)?))
}

fn open_input(input: &str) -> InputAudio {
    if input == STDIN_INPUT {
        InputAudio::Reader(Box::new(std::io::stdin()))
    } else {
        InputAudio::Path(PathBuf::from(input))
    }
}

/// Run the separate command: acquire model → separate → write stems.
///
/// # Arguments
/// * `config` - Base configuration (overridden by `opts`)
/// * `opts` - Command options
/// * `quiet` - Suppress status messages
///
/// # Returns
/// The run report on success; Ctrl-C cancels the run. Any error has been
/// printed to stderr by the time this returns.
pub async fn run_separate_command(
    config: Config,
    opts: SeparateOptions,
    quiet: bool,
) -> Result<RunReport> {
    run_separate_with(config, opts, Arc::new(RunRenderer::new(quiet))).await
}

/// [`run_separate_command`] drawing on a caller-provided renderer.
///
/// Errors raised before the run starts (bad stem count or selection,
/// model download, output creation) are reported through `renderer` the
/// same way as a failed run, exactly once.
pub async fn run_separate_with(
    config: Config,
    opts: SeparateOptions,
    renderer: Arc<RunRenderer>,
) -> Result<RunReport> {
    let reported = renderer.failures_reported();
    let result = separate(config, opts, Arc::clone(&renderer)).await;
    if let Err(e) = &result {
        if renderer.failures_reported() == reported {
            renderer.report_error(e);
        }
    }
    result
}

async fn separate(
    config: Config,
    opts: SeparateOptions,
    renderer: Arc<RunRenderer>,
) -> Result<RunReport> {
    let quiet = renderer.is_quiet();
    let stem_count = opts.stems.unwrap_or(config.separation.stems);
    let vocab = stems::vocabulary(stem_count)?;
    let select = if opts.select.is_empty() {
        vocab.iter().map(|s| s.to_string()).collect()
    } else {
        opts.select.clone()
    };
    // Reject a bad selection before downloading anything
    stems::select(stem_count, &select)?;

    let policy = ChunkPolicy::new(
        opts.segment_secs.unwrap_or(config.separation.segment_secs),
        opts.overlap_secs.unwrap_or(config.separation.overlap_secs),
    );
    policy.validate()?;

    let separator = create_separator(&config, stem_count, opts.no_model, quiet).await?;
    let sink = create_sink(&config, &opts)?;
    let request = RunRequest::new(open_input(&opts.input), stem_count, select, sink);

    let orchestrator = SeparationOrchestrator::new(OrchestratorConfig { policy }, separator);
    let handle = orchestrator.start(request);

    let cancel = handle.cancel_flag();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stemwerk: cancelling...");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let result = tokio::task::spawn_blocking(move || {
        for event in handle.events().iter() {
            renderer.render(&event);
        }
        handle.wait()
    })
    .await
    .map_err(|e| StemwerkError::Other(format!("separation task failed: {e}")));
    ctrl_c.abort();

    result?
}
