use super::BoardSession;
use crate::cli::ListCommands;
use crate::error::Result;
use crate::models::EntityId;

/// Handle all `kb list` subcommands
pub async fn handle_list_command(session: &BoardSession, cmd: ListCommands) -> Result<()> {
    let reconciler = &session.reconciler;
    let format = match cmd {
        ListCommands::Add { title, format } => {
            let list = reconciler.create_list(&title).await?;
            tracing::info!(list = %list.id, "Created list '{}'", list.title);
            format
        },
        ListCommands::Move { id, index, format } => {
            reconciler.move_list(&EntityId::from(id), index).await?;
            format
        },
        ListCommands::Rename { id, title, format } => {
            reconciler.rename_list(&EntityId::from(id), &title).await?;
            format
        },
        ListCommands::Delete { id, format } => {
            reconciler.delete_list(&EntityId::from(id)).await?;
            format
        },
    };
    session.print(&format).await
}
