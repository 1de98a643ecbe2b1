use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tenderqa_core::config::{Config, StorageMode};
use tenderqa_core::provider::create_provider;
use tenderqa_core::Pipeline;

#[derive(Parser)]
#[command(name = "tenderqa")]
#[command(about = "Answer tender questionnaires from a private knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Index a knowledge-base directory")]
    Index {
        #[arg(help = "Directory containing knowledge-base documents")]
        dir: PathBuf,
    },

    #[command(about = "Answer every question of a questionnaire file")]
    Answer {
        #[arg(help = "Questionnaire file, one question per line")]
        file: PathBuf,

        #[arg(short, long, help = "Directory for the results file (defaults to storage.output_path)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Remove all chunks indexed from a source file")]
    Remove {
        #[arg(help = "Source file path exactly as it was indexed")]
        source: String,
    },

    #[command(about = "List indexed source files")]
    Sources,

    #[command(about = "Remove every chunk from the index")]
    Clear,

    #[command(about = "Check the vector store and both models")]
    Check,

    #[command(about = "Answering model commands")]
    Model {
        #[command(subcommand)]
        command: ModelCommands,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    #[command(about = "Show current answering model")]
    Show,

    #[command(about = "Set the answering model")]
    Set {
        #[arg(help = "Model name (e.g., 'mistralai/mistral-7b-instruct-v0.3')")]
        model: String,
    },

    #[command(about = "List models served by the answering endpoint")]
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tenderqa_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Show => show_config(&load_config(&cli.config)?),
        Commands::Index { dir } => index(&load_config(&cli.config)?, &dir).await,
        Commands::Answer { file, output } => answer(&load_config(&cli.config)?, &file, output.as_deref()).await,
        Commands::Remove { source } => remove(&load_config(&cli.config)?, &source).await,
        Commands::Sources => sources(&load_config(&cli.config)?).await,
        Commands::Clear => clear(&load_config(&cli.config)?).await,
        Commands::Check => check(&load_config(&cli.config)?).await,
        Commands::Model { command } => match command {
            ModelCommands::Show => show_model(&load_config(&cli.config)?),
            ModelCommands::Set { model } => set_model(&cli.config, &model),
            ModelCommands::List => list_models(&load_config(&cli.config)?).await,
        },
    }
}

/// Loads the config file, falling back to defaults when it does not exist.
fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        eprintln!(
            "{} {} not found, using default configuration",
            "!".yellow().bold(),
            config_path.display()
        );
        return Ok(Config::default());
    }
    Config::load(config_path).context("Failed to load config")
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:           {}", config.llm.model.cyan());
    println!("  Base URL:        {}", config.llm.base_url);
    println!("  Temperature:     {}", config.llm.temperature);
    println!("  Max Tokens:      {}", config.llm.max_tokens);
    println!("  Max Retries:     {}", config.llm.max_retries);
    println!();
    println!("{}", "Embedding:".bold());
    println!("  Model:           {}", config.embedding.model.cyan());
    println!("  Base URL:        {}", config.embedding.base_url);
    println!("  Dimension:       {}", config.embedding.dimension);
    println!();
    println!("{}", "RAG:".bold());
    println!("  Chunk Size:      {}", config.rag.chunk_size);
    println!("  Chunk Overlap:   {}", config.rag.chunk_overlap);
    println!("  Threshold:       {}", config.rag.similarity_threshold);
    println!("  Max Chunks:      {}", config.rag.max_similar_chunks);
    println!();
    println!("{}", "Storage:".bold());
    match &config.storage.storage_mode {
        StorageMode::Embedded { path } => println!(
            "  Index:           embedded ({})",
            path.as_deref().unwrap_or("in memory only")
        ),
        StorageMode::Grpc { url } => println!("  Index:           qdrant ({})", url),
    }
    println!("  Collection:      {}", config.storage.vector_db.collection_name);
    println!("  Output:          {}", config.storage.output_path);

    Ok(())
}

async fn index(config: &Config, dir: &Path) -> Result<()> {
    let pipeline = Pipeline::new(config.clone()).await?;

    println!("{} Indexing {}...", "→".blue(), dir.display());
    let report = pipeline
        .index_directory(dir)
        .await
        .with_context(|| format!("Failed to index {}", dir.display()))?;

    println!();
    println!("{}", "Indexing complete:".bold().green());
    println!("  Files processed: {}", report.files_processed);
    println!("  Chunks created:  {}", report.chunks_created);
    println!("  Vectors stored:  {}", report.vectors_stored);
    println!("  Time:            {:.1}s", report.elapsed_secs);
    print_errors(&report.errors);

    Ok(())
}

async fn answer(config: &Config, file: &Path, output: Option<&Path>) -> Result<()> {
    let pipeline = Pipeline::new(config.clone()).await?;

    if pipeline.count().await? == 0 {
        println!(
            "{}",
            "The index is empty. Run 'tenderqa index <dir>' first.".yellow()
        );
        return Ok(());
    }

    println!("{} Answering {}...", "→".blue(), file.display());
    let report = pipeline.process_questionnaire(file, output).await?;

    println!();
    println!("{}", "Processing complete:".bold().green());
    println!(
        "  Answered:        {}/{}",
        report.questions_answered.to_string().cyan(),
        report.total_questions
    );
    println!("  Results:         {}", report.output_file);
    println!("  Time:            {:.1}s", report.elapsed_secs);
    print_errors(&report.errors);

    Ok(())
}

async fn remove(config: &Config, source: &str) -> Result<()> {
    let pipeline = Pipeline::new(config.clone()).await?;
    pipeline.remove_source(source).await?;
    println!("{} Removed chunks from: {}", "✓".green().bold(), source.cyan());
    Ok(())
}

async fn sources(config: &Config) -> Result<()> {
    let pipeline = Pipeline::new(config.clone()).await?;
    let sources = pipeline.indexed_sources().await?;

    if sources.is_empty() {
        println!("{}", "No sources indexed.".yellow());
        return Ok(());
    }

    println!("{}", "Indexed sources:".bold().green());
    for source in sources {
        println!("  {} {}", "•".cyan(), source);
    }
    println!();
    println!("Total chunks: {}", pipeline.count().await?);
    Ok(())
}

async fn clear(config: &Config) -> Result<()> {
    let pipeline = Pipeline::new(config.clone()).await?;
    pipeline.clear().await?;
    println!("{} Index cleared", "✓".green().bold());
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    let pipeline = Pipeline::new(config.clone()).await?;

    println!("{} Checking services...", "→".blue());
    let status = pipeline.health_check().await;

    let mark = |ok: bool| if ok { "✓".green().bold() } else { "✗".red().bold() };
    println!("  {} Vector store", mark(status.vector_store));
    println!("  {} Embedding model ({})", mark(status.embedding), config.embedding.model);
    println!("  {} Answering model ({})", mark(status.llm), config.llm.model);
    println!();

    if status.all_ok() {
        println!("{}", "All services are operational".green());
        Ok(())
    } else {
        anyhow::bail!("One or more services are unavailable")
    }
}

fn show_model(config: &Config) -> Result<()> {
    println!("{}: {}", "Current model".bold(), config.llm.model.cyan());
    Ok(())
}

fn set_model(config_path: &Path, model: &str) -> Result<()> {
    let content = std::fs::read_to_string(config_path)
        .context("Failed to read config file")?;

    let mut config: serde_yaml::Value = serde_yaml::from_str(&content)
        .context("Failed to parse config")?;

    let llm = config
        .as_mapping_mut()
        .context("Config file is not a YAML mapping")?
        .entry(serde_yaml::Value::String("llm".to_string()))
        .or_insert_with(|| serde_yaml::Value::Mapping(Default::default()));

    if let Some(llm_map) = llm.as_mapping_mut() {
        llm_map.insert(
            serde_yaml::Value::String("model".to_string()),
            serde_yaml::Value::String(model.to_string()),
        );
    }

    let updated_content = serde_yaml::to_string(&config)
        .context("Failed to serialize config")?;

    std::fs::write(config_path, updated_content)
        .context("Failed to write config file")?;

    println!(
        "{} Model updated to: {}",
        "✓".green().bold(),
        model.cyan()
    );

    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let provider = create_provider(config.llm.provider, &config.llm.base_url, config.llm.timeout())?;

    println!("{} Fetching models from {}...", "→".blue(), config.llm.base_url);
    println!();

    let models = provider
        .list_models()
        .await
        .context("Failed to reach the answering endpoint. Is it running?")?;

    if models.is_empty() {
        println!("{}", "No models found.".yellow());
        return Ok(());
    }

    println!("{}", "Available models:".bold().green());
    println!();

    for model in models {
        let marker = if model == config.llm.model { "*".green().bold() } else { "•".cyan() };
        println!("  {} {}", marker, model.bold());
    }

    println!();
    println!("Use {} to set a model", "tenderqa model set <model>".bold());

    Ok(())
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("{}", format!("{} error(s):", errors.len()).red().bold());
    for error in errors {
        println!("  {} {}", "✗".red(), error);
    }
}
