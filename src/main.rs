use anyhow::{Context, Result};
use healing_pipeline::agent::{AgentClientConfig, SubprocessClient};
use healing_pipeline::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use healing_pipeline::cli::output::*;
use healing_pipeline::cli::{Cli, Command};
use healing_pipeline::core::config::PipelineConfig;
use healing_pipeline::core::RunStatus;
use healing_pipeline::execution::ExecutionEngine;
use healing_pipeline::persistence::{PersistenceBackend, SqliteSessionStore};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let mut pipeline = config.to_pipeline();

    for (key, value) in &cmd.variable {
        pipeline.variables.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }
    if let Some(max) = cmd.max_iterations {
        pipeline.max_iterations = max;
    }
    if let Some(target) = &cmd.target {
        pipeline.target_path = target.clone();
    }
    if pipeline.target_path.is_relative() {
        // Relative targets are resolved against the pipeline file's directory
        let base = PathBuf::from(&cmd.file)
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        pipeline.target_path = base.join(&pipeline.target_path);
    }

    let store = if cmd.no_history {
        None
    } else {
        Some(SqliteSessionStore::with_default_path().await?)
    };

    let mut agent_config = AgentClientConfig::new();
    if let Some(settings) = &config.agent {
        if let Some(executable) = &settings.executable {
            agent_config = agent_config.with_executable(executable.clone());
        }
        if let Some(model) = &settings.model {
            agent_config = agent_config.with_model(model.clone());
        }
        if let Some(max_turns) = settings.max_turns {
            agent_config = agent_config.with_max_turns(max_turns);
        }
        if let Some(timeout) = settings.timeout_secs {
            agent_config = agent_config.with_timeout(timeout);
        }
        agent_config = agent_config.with_extra_args(settings.extra_args.clone());
    }
    if let Some(path) = &cmd.agent_path {
        agent_config = agent_config.with_executable(path.clone());
    }
    if let Some(model) = &cmd.model {
        agent_config = agent_config.with_model(model.clone());
    }

    let agent = SubprocessClient::new(agent_config.clone());
    let engine = ExecutionEngine::new(agent, agent_config);
    engine.add_event_handler(|event| println!("{}", format_execution_event(&event)));

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Interrupted, cancelling run...", WARN);
            handle.cancel();
        }
    });

    println!();
    let session = engine.run(&pipeline).await;
    print_usage(&session);

    if let Some(store) = &store {
        store.save_session(&session).await?;
        println!(
            "\n{} Session saved to history (ID: {})",
            INFO,
            style(&session.id.to_string()[..8]).dim()
        );
    }

    if session.status != RunStatus::Succeeded {
        if let Some(error) = &session.error {
            println!("{} {}", CROSS, style(error).red());
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!("  Markers: {}", style(config.markers.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteSessionStore::with_default_path().await?;

    if let Some(id) = &cmd.session_id {
        let session_id = uuid::Uuid::parse_str(id).context("Invalid session ID format")?;
        match store.load_session(session_id).await? {
            Some(session) if cmd.json => println!("{}", serde_json::to_string_pretty(&session)?),
            Some(session) => print_session_details(&session),
            None => println!("{} Session not found", WARN),
        }
        return Ok(());
    }

    let mut sessions = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_sessions(pipeline_name).await?
    } else {
        let mut all = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all.extend(store.list_sessions(&pipeline).await?);
        }
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    };
    sessions.truncate(cmd.limit);

    if sessions.is_empty() {
        println!("{} No sessions found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "sessions": sessions });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, sessions.len());
        for summary in &sessions {
            println!("  {}", format_session_summary(summary));
        }
    }

    Ok(())
}
