// CLI command handlers module
//
// Every handler opens a `BoardSession` (config + HTTP gateway + loaded
// reconciler), runs one operation and prints the board.

pub mod list_commands;
pub mod task_commands;
pub mod utils;
pub mod watch;

use crate::cli::Cli;
use crate::config::{default_config_path, ClientConfig, ConfigOverrides};
use crate::error::Result;
use crate::gateway::HttpGateway;
use crate::models::EntityId;
use crate::reconciler::Reconciler;
use std::sync::Arc;

pub use list_commands::handle_list_command;
pub use task_commands::handle_task_command;
pub use utils::print_board;
pub use watch::handle_watch;

/// A loaded board ready for one command
pub struct BoardSession {
    pub config: ClientConfig,
    pub project_id: EntityId,
    pub reconciler: Arc<Reconciler>,
}

impl BoardSession {
    pub fn overrides(cli: &Cli) -> ConfigOverrides {
        ConfigOverrides {
            server_url: cli.server.clone(),
            user_id: cli.user.clone(),
            project_id: cli.project.clone(),
        }
    }

    /// Resolve configuration for `cli` without touching the network
    pub fn load_config(cli: &Cli) -> Result<ClientConfig> {
        let path = default_config_path();
        ClientConfig::load(path.as_deref(), &Self::overrides(cli))
    }

    pub async fn open(config: ClientConfig) -> Result<Self> {
        let project_id = config.require_project()?;
        let gateway = Arc::new(HttpGateway::with_timeout(
            &config.server_url,
            config.user_id.clone(),
            config.request_timeout(),
        )?);
        let reconciler = Arc::new(Reconciler::new(
            gateway.clone(),
            gateway,
            config.user_id.clone(),
        ));
        reconciler.load_project(&project_id).await?;
        Ok(Self {
            config,
            project_id,
            reconciler,
        })
    }

    pub async fn print(&self, format: &str) -> Result<()> {
        print_board(&self.reconciler.snapshot().await, format)
    }
}

/// Handle `kb board`
pub async fn handle_board(session: &BoardSession, format: &str) -> Result<()> {
    session.print(format).await
}
