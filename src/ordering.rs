//! Dense position bookkeeping for lists and tasks.
//!
//! Every function here keeps positions within a container equal to `0..n-1`.
//! Tasks are stored flat; a list's sequence is its tasks sorted by position,
//! with storage order breaking ties.

use crate::error::{BoardError, Result};
use crate::models::{EntityId, List, Task};
use std::collections::{HashMap, HashSet};

/// Tasks of one list in display order
pub fn tasks_in<'a>(tasks: &'a [Task], list_id: &EntityId) -> Vec<&'a Task> {
    let mut seq: Vec<&Task> = tasks.iter().filter(|t| &t.list_id == list_id).collect();
    seq.sort_by_key(|t| t.position);
    seq
}

/// Task ids of one list in display order
pub fn ordered_task_ids(tasks: &[Task], list_id: &EntityId) -> Vec<EntityId> {
    tasks_in(tasks, list_id)
        .into_iter()
        .map(|t| t.id.clone())
        .collect()
}

/// True when the positions are exactly `0..n-1` in some order
pub fn is_dense<I>(positions: I) -> bool
where
    I: IntoIterator<Item = usize>,
{
    let mut positions: Vec<usize> = positions.into_iter().collect();
    positions.sort_unstable();
    positions.iter().enumerate().all(|(i, p)| i == *p)
}

pub fn list_is_dense(tasks: &[Task], list_id: &EntityId) -> bool {
    is_dense(
        tasks
            .iter()
            .filter(|t| &t.list_id == list_id)
            .map(|t| t.position),
    )
}

pub fn lists_are_dense(lists: &[List]) -> bool {
    is_dense(lists.iter().map(|l| l.position))
}

/// Write `seq` into the tasks as list `list_id`, positions `0..seq.len()`
fn assign_sequence(
    tasks: &mut [Task],
    index: &HashMap<EntityId, usize>,
    list_id: &EntityId,
    seq: &[EntityId],
) {
    for (position, id) in seq.iter().enumerate() {
        if let Some(&i) = index.get(id) {
            tasks[i].list_id = list_id.clone();
            tasks[i].position = position;
        }
    }
}

fn index_of(tasks: &[Task]) -> HashMap<EntityId, usize> {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect()
}

/// Make `seq` the content of `list_id`, positions `0..seq.len()`.
/// Ids in `seq` that are not in `tasks` are skipped.
pub fn set_sequence(tasks: &mut [Task], list_id: &EntityId, seq: &[EntityId]) {
    let index = index_of(tasks);
    let present: Vec<EntityId> = seq
        .iter()
        .filter(|id| index.contains_key(*id))
        .cloned()
        .collect();
    assign_sequence(tasks, &index, list_id, &present);
}

/// Close gaps in one list, keeping relative order
pub fn renumber_list(tasks: &mut [Task], list_id: &EntityId) {
    let seq = ordered_task_ids(tasks, list_id);
    let index = index_of(tasks);
    assign_sequence(tasks, &index, list_id, &seq);
}

/// Sort lists by position and renumber them `0..n-1`
pub fn renumber_lists(lists: &mut [List]) {
    lists.sort_by_key(|l| l.position);
    for (position, list) in lists.iter_mut().enumerate() {
        list.position = position;
    }
}

/// Move one task to `target_index` of `target_list`.
///
/// The task leaves its source list first, so for a same-list move the index
/// addresses the gap-closed sequence. Returns the source list id.
pub fn move_task(
    tasks: &mut [Task],
    task_id: &EntityId,
    target_list: &EntityId,
    target_index: usize,
) -> Result<EntityId> {
    let source_list = tasks
        .iter()
        .find(|t| &t.id == task_id)
        .map(|t| t.list_id.clone())
        .ok_or_else(|| BoardError::not_found("task", task_id))?;

    let mut source_seq = ordered_task_ids(tasks, &source_list);
    source_seq.retain(|id| id != task_id);

    let mut target_seq = if &source_list == target_list {
        source_seq.clone()
    } else {
        ordered_task_ids(tasks, target_list)
    };

    if target_index > target_seq.len() {
        return Err(BoardError::ValidationError(format!(
            "Target index {} is out of range (list holds {} other tasks)",
            target_index,
            target_seq.len()
        )));
    }
    target_seq.insert(target_index, task_id.clone());

    let index = index_of(tasks);
    if &source_list != target_list {
        assign_sequence(tasks, &index, &source_list, &source_seq);
    }
    assign_sequence(tasks, &index, target_list, &target_seq);

    Ok(source_list)
}

/// Append several tasks, in display order, to the end of `target_list`.
///
/// Display order is list order first, then position. Returns every list
/// whose sequence changed, target included.
pub fn move_tasks_to_end(
    tasks: &mut [Task],
    lists: &[List],
    task_ids: &[EntityId],
    target_list: &EntityId,
) -> Result<Vec<EntityId>> {
    let moving: HashSet<&EntityId> = task_ids.iter().collect();
    let list_rank: HashMap<&EntityId, usize> =
        lists.iter().map(|l| (&l.id, l.position)).collect();

    let mut picked: Vec<&Task> = tasks.iter().filter(|t| moving.contains(&t.id)).collect();
    if picked.len() != moving.len() {
        let missing = task_ids
            .iter()
            .find(|id| !picked.iter().any(|t| &t.id == *id))
            .map(|id| id.to_string())
            .unwrap_or_default();
        return Err(BoardError::not_found("task", missing));
    }
    picked.sort_by_key(|t| {
        (
            list_rank.get(&t.list_id).copied().unwrap_or(usize::MAX),
            t.position,
        )
    });
    let moved_in_order: Vec<EntityId> = picked.iter().map(|t| t.id.clone()).collect();

    let mut affected: Vec<EntityId> = Vec::new();
    for t in &picked {
        if !affected.contains(&t.list_id) {
            affected.push(t.list_id.clone());
        }
    }
    if !affected.contains(target_list) {
        affected.push(target_list.clone());
    }

    let mut sequences: Vec<(EntityId, Vec<EntityId>)> = affected
        .iter()
        .map(|list_id| {
            let mut seq = ordered_task_ids(tasks, list_id);
            seq.retain(|id| !moving.contains(id));
            if list_id == target_list {
                seq.extend(moved_in_order.iter().cloned());
            }
            (list_id.clone(), seq)
        })
        .collect();

    let index = index_of(tasks);
    for (list_id, seq) in sequences.drain(..) {
        assign_sequence(tasks, &index, &list_id, &seq);
    }

    Ok(affected)
}

/// Move a list to `target_index` within the project's column order
pub fn move_list(lists: &mut Vec<List>, list_id: &EntityId, target_index: usize) -> Result<()> {
    renumber_lists(lists);
    let from = lists
        .iter()
        .position(|l| &l.id == list_id)
        .ok_or_else(|| BoardError::not_found("list", list_id))?;

    if target_index >= lists.len() {
        return Err(BoardError::ValidationError(format!(
            "Target index {} is out of range (project holds {} other lists)",
            target_index,
            lists.len() - 1
        )));
    }

    let list = lists.remove(from);
    lists.insert(target_index, list);
    for (position, list) in lists.iter_mut().enumerate() {
        list.position = position;
    }
    Ok(())
}

/// Remove tasks by id and close the gaps they leave.
/// Returns the removed tasks.
pub fn remove_tasks(tasks: &mut Vec<Task>, task_ids: &[EntityId]) -> Vec<Task> {
    let doomed: HashSet<&EntityId> = task_ids.iter().collect();
    let (removed, kept): (Vec<Task>, Vec<Task>) =
        tasks.drain(..).partition(|t| doomed.contains(&t.id));
    *tasks = kept;

    let mut touched: Vec<&EntityId> = removed.iter().map(|t| &t.list_id).collect();
    touched.sort();
    touched.dedup();
    for list_id in touched {
        renumber_list(tasks, list_id);
    }
    removed
}

/// What `normalize_board` had to fix
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub lists_renumbered: bool,
    pub task_lists_renumbered: Vec<EntityId>,
    pub orphans_dropped: Vec<EntityId>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        !self.lists_renumbered
            && self.task_lists_renumbered.is_empty()
            && self.orphans_dropped.is_empty()
    }
}

/// Bring freshly loaded data into dense order.
/// Tasks pointing at unknown lists are dropped.
pub fn normalize_board(lists: &mut Vec<List>, tasks: &mut Vec<Task>) -> NormalizeReport {
    let mut report = NormalizeReport {
        lists_renumbered: !lists_are_dense(lists),
        ..Default::default()
    };
    renumber_lists(lists);

    let known: HashSet<EntityId> = lists.iter().map(|l| l.id.clone()).collect();
    tasks.retain(|t| {
        let keep = known.contains(&t.list_id);
        if !keep {
            report.orphans_dropped.push(t.id.clone());
        }
        keep
    });

    for list in lists.iter() {
        if !list_is_dense(tasks, &list.id) {
            report.task_lists_renumbered.push(list.id.clone());
        }
        renumber_list(tasks, &list.id);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use crate::priority::Priority;

    fn task(id: &str, list: &str, position: usize) -> Task {
        Task {
            id: id.into(),
            title: id.to_uppercase(),
            description: None,
            list_id: list.into(),
            project_id: "p1".into(),
            position,
            priority: Priority::Medium,
            due_date: None,
            assignee_id: None,
            user_id: UserId::from("u1"),
            created_at: None,
            updated_at: None,
        }
    }

    fn list(id: &str, position: usize) -> List {
        List {
            id: id.into(),
            title: id.to_string(),
            project_id: "p1".into(),
            position,
            created_at: None,
            updated_at: None,
        }
    }

    fn order(tasks: &[Task], list_id: &str) -> Vec<(String, usize)> {
        tasks_in(tasks, &list_id.into())
            .into_iter()
            .map(|t| (t.id.to_string(), t.position))
            .collect()
    }

    #[test]
    fn test_is_dense() {
        assert!(is_dense(vec![]));
        assert!(is_dense(vec![2, 0, 1]));
        assert!(!is_dense(vec![0, 2]));
        assert!(!is_dense(vec![0, 0, 1]));
    }

    #[test]
    fn test_same_list_move_to_end() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "todo", 1), task("t3", "todo", 2)];
        move_task(&mut tasks, &"t1".into(), &"todo".into(), 2).unwrap();
        assert_eq!(
            order(&tasks, "todo"),
            vec![("t2".into(), 0), ("t3".into(), 1), ("t1".into(), 2)]
        );
    }

    #[test]
    fn test_same_list_move_up() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "todo", 1), task("t3", "todo", 2)];
        move_task(&mut tasks, &"t3".into(), &"todo".into(), 0).unwrap();
        assert_eq!(
            order(&tasks, "todo"),
            vec![("t3".into(), 0), ("t1".into(), 1), ("t2".into(), 2)]
        );
    }

    #[test]
    fn test_cross_list_move() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "doing", 0)];
        let source = move_task(&mut tasks, &"t1".into(), &"doing".into(), 0).unwrap();
        assert_eq!(source, EntityId::from("todo"));
        assert!(order(&tasks, "todo").is_empty());
        assert_eq!(
            order(&tasks, "doing"),
            vec![("t1".into(), 0), ("t2".into(), 1)]
        );
    }

    #[test]
    fn test_move_rejects_out_of_range_index() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "todo", 1)];
        let before = tasks.clone();
        // after removal the list holds one task, so index 2 is too far
        let err = move_task(&mut tasks, &"t1".into(), &"todo".into(), 2).unwrap_err();
        assert!(matches!(err, BoardError::ValidationError(_)));
        assert_eq!(tasks, before);
    }

    #[test]
    fn test_move_unknown_task() {
        let mut tasks = vec![task("t1", "todo", 0)];
        let err = move_task(&mut tasks, &"nope".into(), &"todo".into(), 0).unwrap_err();
        assert!(matches!(err, BoardError::NotFound { .. }));
    }

    #[test]
    fn test_move_into_empty_list() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "todo", 1)];
        move_task(&mut tasks, &"t2".into(), &"done".into(), 0).unwrap();
        assert_eq!(order(&tasks, "todo"), vec![("t1".into(), 0)]);
        assert_eq!(order(&tasks, "done"), vec![("t2".into(), 0)]);
    }

    #[test]
    fn test_move_many_keeps_display_order() {
        let lists = vec![list("todo", 0), list("doing", 1), list("done", 2)];
        let mut tasks = vec![
            task("a", "doing", 0),
            task("b", "todo", 0),
            task("c", "todo", 1),
            task("d", "done", 0),
        ];
        let affected = move_tasks_to_end(
            &mut tasks,
            &lists,
            &["a".into(), "c".into()],
            &"done".into(),
        )
        .unwrap();

        assert_eq!(affected.len(), 3);
        assert_eq!(order(&tasks, "todo"), vec![("b".into(), 0)]);
        assert!(order(&tasks, "doing").is_empty());
        // c sits in an earlier column than a, so it lands first
        assert_eq!(
            order(&tasks, "done"),
            vec![("d".into(), 0), ("c".into(), 1), ("a".into(), 2)]
        );
    }

    #[test]
    fn test_move_list() {
        let mut lists = vec![list("a", 0), list("b", 1), list("c", 2)];
        move_list(&mut lists, &"a".into(), 2).unwrap();
        let ids: Vec<_> = lists.iter().map(|l| (l.id.to_string(), l.position)).collect();
        assert_eq!(
            ids,
            vec![("b".into(), 0), ("c".into(), 1), ("a".into(), 2)]
        );
        assert!(move_list(&mut lists, &"a".into(), 3).is_err());
    }

    #[test]
    fn test_set_sequence_skips_unknown_ids() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "done", 0)];
        set_sequence(
            &mut tasks,
            &"todo".into(),
            &["t2".into(), "ghost".into(), "t1".into()],
        );
        assert_eq!(
            order(&tasks, "todo"),
            vec![("t2".into(), 0), ("t1".into(), 1)]
        );
        assert!(order(&tasks, "done").is_empty());
    }

    #[test]
    fn test_remove_tasks_closes_gaps() {
        let mut tasks = vec![task("t1", "todo", 0), task("t2", "todo", 1), task("t3", "todo", 2)];
        let removed = remove_tasks(&mut tasks, &["t1".into(), "t2".into()]);
        assert_eq!(removed.len(), 2);
        assert_eq!(order(&tasks, "todo"), vec![("t3".into(), 0)]);
    }

    #[test]
    fn test_normalize_board() {
        let mut lists = vec![list("b", 4), list("a", 1)];
        let mut tasks = vec![task("t1", "a", 3), task("t2", "a", 7), task("t9", "gone", 0)];
        let report = normalize_board(&mut lists, &mut tasks);

        assert!(report.lists_renumbered);
        assert_eq!(report.task_lists_renumbered, vec![EntityId::from("a")]);
        assert_eq!(report.orphans_dropped, vec![EntityId::from("t9")]);
        assert_eq!(lists[0].id, EntityId::from("a"));
        assert_eq!(order(&tasks, "a"), vec![("t1".into(), 0), ("t2".into(), 1)]);
    }
}
