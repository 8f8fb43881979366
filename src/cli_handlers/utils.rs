//! Utility functions for CLI handlers
//!
//! Argument parsing helpers and the text/JSON board renderers.

use crate::board::BoardSnapshot;
use crate::error::{BoardError, Result};
use crate::models::{EntityId, Task};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp
pub fn parse_due_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            BoardError::ValidationError(format!(
                "Invalid due date '{}': expected YYYY-MM-DD or RFC 3339",
                input
            ))
        })
}

pub fn parse_ids(ids: &[String]) -> Vec<EntityId> {
    ids.iter().map(|id| EntityId::from(id.as_str())).collect()
}

fn task_line(task: &Task, selected: bool, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "  {}{:>2}. {} [{}] ({})",
        if selected { "*" } else { " " },
        task.position,
        task.title,
        task.priority,
        task.id
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {}", due.format("%Y-%m-%d")));
        if task.is_overdue(now) {
            line.push_str(" OVERDUE");
        }
    }
    if let Some(assignee) = &task.assignee_id {
        line.push_str(&format!(" @{}", assignee));
    }
    if task.id.is_temporary() {
        line.push_str(" (saving)");
    }
    line
}

/// Human-readable board, one block per list
pub fn render_board_text(snapshot: &BoardSnapshot) -> String {
    let now = Utc::now();
    let mut out = String::new();

    match &snapshot.project {
        Some(project) => out.push_str(&format!("Project: {} ({})\n", project.name, project.id)),
        None => out.push_str("No project loaded\n"),
    }

    for list in snapshot.ordered_lists() {
        let tasks = snapshot.tasks_in(&list.id);
        out.push_str(&format!(
            "\n[{}] {} ({}) - {} task{}\n",
            list.position,
            list.title,
            list.id,
            tasks.len(),
            if tasks.len() == 1 { "" } else { "s" }
        ));
        if tasks.is_empty() {
            out.push_str("     (empty)\n");
        }
        for task in tasks {
            let selected = snapshot.selected.contains(&task.id);
            out.push_str(&task_line(task, selected, now));
            out.push('\n');
        }
    }

    let summary = snapshot.summary_at(now);
    out.push_str(&format!(
        "\nSummary: {} tasks (low {}, medium {}, high {}), {} overdue\n",
        summary.total_tasks,
        summary.by_priority.low,
        summary.by_priority.medium,
        summary.by_priority.high,
        summary.overdue
    ));
    out
}

pub fn render_board_json(snapshot: &BoardSnapshot) -> Result<String> {
    let value = json!({
        "board": snapshot,
        "summary": snapshot.summary(),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Print the board in the requested format (`text` or `json`)
pub fn print_board(snapshot: &BoardSnapshot, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", render_board_json(snapshot)?),
        "text" => print!("{}", render_board_text(snapshot)),
        other => {
            return Err(BoardError::ValidationError(format!(
                "Unknown format '{}': expected text or json",
                other
            )))
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{List, Project, UserId};
    use crate::priority::Priority;

    #[test]
    fn test_parse_due_date() {
        let day = parse_due_date("2026-11-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2026-11-01T00:00:00+00:00");

        let exact = parse_due_date("2026-11-01T09:30:00+02:00").unwrap();
        assert_eq!(exact.to_rfc3339(), "2026-11-01T07:30:00+00:00");

        assert!(matches!(
            parse_due_date("next friday"),
            Err(BoardError::ValidationError(_))
        ));
    }

    #[test]
    fn test_render_text_marks_pending_tasks() {
        let snapshot = BoardSnapshot {
            project: Some(Project {
                id: "p1".into(),
                name: "Launch".into(),
                description: None,
                owner_id: UserId::from("u1"),
                due_date: None,
            }),
            lists: vec![List {
                id: "l1".into(),
                title: "Todo".into(),
                project_id: "p1".into(),
                position: 0,
                created_at: None,
                updated_at: None,
            }],
            tasks: vec![Task {
                id: EntityId::temporary(),
                title: "Draft".into(),
                description: None,
                list_id: "l1".into(),
                project_id: "p1".into(),
                position: 0,
                priority: Priority::High,
                due_date: None,
                assignee_id: Some("kim".into()),
                user_id: UserId::from("u1"),
                created_at: None,
                updated_at: None,
            }],
            ..Default::default()
        };

        let text = render_board_text(&snapshot);
        assert!(text.contains("Project: Launch (p1)"));
        assert!(text.contains("[0] Todo (l1) - 1 task\n"));
        assert!(text.contains("Draft [high]"));
        assert!(text.contains("@kim (saving)"));
        assert!(text.contains("Summary: 1 tasks (low 0, medium 0, high 1), 0 overdue"));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = print_board(&BoardSnapshot::default(), "yaml").unwrap_err();
        assert!(err.to_string().contains("Unknown format"));
    }
}
