use super::utils::{parse_due_date, parse_ids};
use super::BoardSession;
use crate::cli::TaskCommands;
use crate::error::Result;
use crate::models::{EntityId, TaskDraft, TaskPatch, UserId};
use crate::priority::Priority;

/// Build a patch from `kb task update` flags.
/// The `clear_*` and `unassign` switches set a field to null.
#[allow(clippy::too_many_arguments)]
pub fn build_patch(
    title: Option<String>,
    description: Option<String>,
    clear_description: bool,
    priority: Option<String>,
    due: Option<String>,
    clear_due: bool,
    assignee: Option<String>,
    unassign: bool,
) -> Result<TaskPatch> {
    let description = match (description, clear_description) {
        (_, true) => Some(None),
        (Some(text), false) => Some(Some(text)),
        (None, false) => None,
    };
    let due_date = match (due, clear_due) {
        (_, true) => Some(None),
        (Some(raw), false) => Some(Some(parse_due_date(&raw)?)),
        (None, false) => None,
    };
    let assignee_id = match (assignee, unassign) {
        (_, true) => Some(None),
        (Some(user), false) => Some(Some(UserId::from(user))),
        (None, false) => None,
    };

    Ok(TaskPatch {
        title,
        description,
        priority: Priority::parse_optional(priority.as_deref())?,
        due_date,
        assignee_id,
    })
}

/// Handle all `kb task` subcommands
pub async fn handle_task_command(session: &BoardSession, cmd: TaskCommands) -> Result<()> {
    let reconciler = &session.reconciler;
    let format = match cmd {
        TaskCommands::Add {
            list,
            title,
            description,
            priority,
            due,
            assignee,
            format,
        } => {
            let draft = TaskDraft {
                title,
                description,
                priority: Priority::parse_optional(priority.as_deref())?.unwrap_or_default(),
                due_date: due.as_deref().map(parse_due_date).transpose()?,
                assignee_id: assignee.map(UserId::from),
            };
            let task = reconciler
                .create_task(&EntityId::from(list), draft)
                .await?;
            tracing::info!(task = %task.id, "Created task '{}'", task.title);
            format
        },

        TaskCommands::Move {
            id,
            list,
            index,
            format,
        } => {
            reconciler
                .move_task(&EntityId::from(id), &EntityId::from(list), index)
                .await?;
            format
        },

        TaskCommands::MoveMany { ids, to, format } => {
            reconciler
                .move_tasks(&parse_ids(&ids), &EntityId::from(to))
                .await?;
            format
        },

        TaskCommands::Update {
            id,
            title,
            description,
            clear_description,
            priority,
            due,
            clear_due,
            assignee,
            unassign,
            format,
        } => {
            let patch = build_patch(
                title,
                description,
                clear_description,
                priority,
                due,
                clear_due,
                assignee,
                unassign,
            )?;
            reconciler.update_task(&EntityId::from(id), patch).await?;
            format
        },

        TaskCommands::Delete { id, format } => {
            reconciler.delete_task(&EntityId::from(id)).await?;
            format
        },

        TaskCommands::BulkDelete { ids, format } => {
            let deleted = reconciler.bulk_delete_tasks(&parse_ids(&ids)).await?;
            tracing::info!(count = deleted.len(), "Bulk delete finished");
            format
        },
    };
    session.print(&format).await
}
