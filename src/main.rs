use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use stemwerk::app::{SeparateOptions, artifact_store, run_separate_command};
use stemwerk::cli::{Cli, Commands, ConfigAction, ModelsAction};
use stemwerk::config::Config;
use stemwerk::output::DownloadRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    log::debug!("stemwerk {}", stemwerk::version_string());

    match cli.command {
        Commands::Separate {
            input,
            stems,
            select,
            output_dir,
            tree,
            no_model,
            segment,
            overlap,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let opts = SeparateOptions {
                input,
                stems,
                select,
                output_dir,
                tree,
                no_model,
                segment_secs: segment,
                overlap_secs: overlap,
            };
            // Every failure, including ones before the run starts, is
            // printed by the renderer
            if run_separate_command(config, opts, cli.quiet).await.is_err() {
                std::process::exit(1);
            }
        }
        Commands::Models { action } => {
            let config = load_config(cli.config.as_deref())?;
            handle_models_command(action, &config, cli.quiet).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "stemwerk",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Route `log` output to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/stemwerk/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Handle model management commands.
async fn handle_models_command(action: ModelsAction, config: &Config, quiet: bool) -> Result<()> {
    let store = artifact_store(config)?;

    match action {
        ModelsAction::List => {
            let files = store.list_cached()?;
            if files.is_empty() {
                println!("No models installed in {}", store.models_dir().display());
                return Ok(());
            }
            println!("Installed models ({}):", store.models_dir().display());
            for file in files {
                println!("  {:<40} {:>8.1} MB", file.name, file.size as f64 / 1_048_576.0);
            }
        }
        ModelsAction::Install { stems } => {
            let stems = stems.unwrap_or(config.separation.stems);
            let mut renderer = DownloadRenderer::new(quiet);
            let artifact = store
                .ensure_artifact_with(stems, &mut |event| renderer.render(event))
                .await?;
            println!("Model '{}' installed successfully", artifact.entry.id);
            println!("Location: {}", artifact.path.display());
        }
        ModelsAction::Manifest => {
            let entries = store.resolve_manifest(store.release_tag()).await?;
            println!("Release {}:", store.release_tag());
            for entry in entries {
                let installed = store.artifact_path(&entry).exists();
                let marker = if installed {
                    format!("{}", "[installed]".green())
                } else {
                    String::new()
                };
                let size = entry
                    .size
                    .map(|s| format!("{:.1} MB", s as f64 / 1_048_576.0))
                    .unwrap_or_else(|| "? MB".to_string());
                println!(
                    "  {:<24} {} stems  {:<6} {:<32} {:>10} {}",
                    entry.id, entry.stem_count, entry.format, entry.file_name, size, marker
                );
            }
        }
        ModelsAction::Clear => {
            let removed = store.clear_cache()?;
            println!(
                "Removed {} file(s) from {}",
                removed,
                store.models_dir().display()
            );
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    let config_path = custom_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let status = if config_path.exists() {
                ""
            } else {
                " (not created, using defaults)"
            };
            println!("{}{}", config_path.display(), status);
        }
        ConfigAction::Dump => {
            print!("{}", Config::default().to_toml()?);
        }
    }
    Ok(())
}
