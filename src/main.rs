use ragline::cli::{Cli, Commands, ConfigAction};
use ragline::config::Config;
use ragline::error::{RaglineError, Result};
use ragline::{RetrievalLimits, RetrievedContext, Retriever};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Retrieve {
            question,
            top_k,
            search_top_k,
            profile,
            basic,
            json,
        } => {
            cmd_retrieve(cli.config, profile, &question, top_k, search_top_k, basic, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "ragline=debug" } else { "ragline=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_retrieve(
    config_path: Option<std::path::PathBuf>,
    profile: Option<String>,
    question: &str,
    top_k: Option<usize>,
    search_top_k: Option<usize>,
    basic: bool,
    json: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        return Err(RaglineError::Config("Question cannot be empty".to_string()));
    }

    let config = load_config(config_path, profile)?;
    let configured = config.retrieval.limits();
    let limits = RetrievalLimits::new(
        search_top_k.or(top_k).unwrap_or(configured.search_top_k),
        top_k.unwrap_or(configured.context_top_k),
    );

    let rt = tokio::runtime::Runtime::new().map_err(|e| RaglineError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    let result = rt.block_on(async {
        let retriever = Retriever::from_config(&config)?;

        // Ctrl-C aborts in-flight upstream calls
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling retrieval");
                on_signal.cancel();
            }
        });

        let result = if basic {
            retriever.retrieve_basic(question, limits, &cancel).await
        } else {
            retriever.retrieve(question, limits, &cancel).await
        };
        Ok::<RetrievedContext, RaglineError>(result?)
    })?;

    if json {
        let out = serde_json::to_string_pretty(&result).map_err(|e| RaglineError::Json {
            source: e,
            context: "Failed to serialize retrieval result".to_string(),
        })?;
        println!("{}", out);
    } else if result.is_empty() {
        println!("No relevant information found");
    } else {
        println!("{}", result.context);
        println!("\nSources:");
        for source in &result.sources {
            println!("  - {}", source);
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            let text = toml::to_string_pretty(&config)?;
            println!("{}", text);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RaglineError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    Config::load_or_default(&path, profile.as_deref())
}
