use clap::Parser;
use kanban_sync::cli::{Cli, Commands};
use kanban_sync::cli_handlers::{
    handle_board, handle_list_command, handle_task_command, handle_watch, BoardSession,
};
use kanban_sync::error::Result;
use kanban_sync::logging::{
    cleanup_old_logs, init_logging, log_file_path, ApplicationMode, LoggingConfig,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json);
    if let Commands::Watch { .. } = cli.command {
        if cli.verbose > 0 {
            log_config = LoggingConfig::for_mode(ApplicationMode::Watch);
        }
    }

    // config errors are reported after logging is up
    let config = BoardSession::load_config(&cli);
    if let Ok(config) = &config {
        if let Some(path) = &config.log_file {
            log_config = log_config.with_file(Some(path.clone()));
        } else if std::env::var("KANBAN_LOG_TO_FILE").is_ok() {
            log_config = log_config.with_file(log_file_path(ApplicationMode::Cli));
        }
    }

    if let Err(e) = init_logging(log_config.clone()) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Some(dir) = log_config.file_output.as_ref().and_then(|p| p.parent()) {
        let retention_days = std::env::var("KANBAN_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);
        cleanup_old_logs(dir, retention_days).ok();
    }

    let result = match config {
        Ok(config) => run(&cli, config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        let error_response = e.to_error_response();
        match serde_json::to_string_pretty(&error_response) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: kanban_sync::config::ClientConfig) -> Result<()> {
    let session = BoardSession::open(config).await?;

    match cli.command.clone() {
        Commands::Board { format } => handle_board(&session, &format).await?,
        Commands::List(list_cmd) => handle_list_command(&session, list_cmd).await?,
        Commands::Task(task_cmd) => handle_task_command(&session, task_cmd).await?,
        Commands::Watch { format } => handle_watch(&session, &format).await?,
    }

    Ok(())
}
