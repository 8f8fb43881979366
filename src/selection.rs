//! Multi-select state over task identifiers.
//!
//! Selection is a plain id set plus the anchor used for range selection. It
//! never reads or writes positions.

use crate::models::{EntityId, Task};
use crate::ordering;
use std::collections::BTreeSet;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Selection {
    ids: BTreeSet<EntityId>,
    anchor: Option<EntityId>,
}

/// Ids between `from` and `to` inclusive, in the display order of their list.
///
/// `None` when either task is unknown or the two sit in different lists.
pub fn range_between(tasks: &[Task], from: &EntityId, to: &EntityId) -> Option<Vec<EntityId>> {
    let from_list = &tasks.iter().find(|t| &t.id == from)?.list_id;
    let to_list = &tasks.iter().find(|t| &t.id == to)?.list_id;
    if from_list != to_list {
        return None;
    }

    let seq = ordering::ordered_task_ids(tasks, from_list);
    let a = seq.iter().position(|id| id == from)?;
    let b = seq.iter().position(|id| id == to)?;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Some(seq[lo..=hi].to_vec())
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with one task, which becomes the anchor
    pub fn select_single(&mut self, id: &EntityId) {
        self.ids.clear();
        self.ids.insert(id.clone());
        self.anchor = Some(id.clone());
    }

    /// Ctrl-click: flip one id, keeping the rest
    pub fn toggle(&mut self, id: &EntityId) {
        if !self.ids.remove(id) {
            self.ids.insert(id.clone());
        }
        self.anchor = Some(id.clone());
    }

    /// Shift-click: select from the anchor to `id` within one list.
    /// Without an anchor in the same list this is a single select.
    pub fn select_range(&mut self, tasks: &[Task], id: &EntityId) {
        let range = self
            .anchor
            .as_ref()
            .and_then(|anchor| range_between(tasks, anchor, id));
        match range {
            Some(ids) => {
                self.ids = ids.into_iter().collect();
            },
            None => self.select_single(id),
        }
    }

    pub fn select_all<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.ids = ids.into_iter().collect();
        self.anchor = None;
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.anchor = None;
    }

    /// Drop ids that no longer exist
    pub fn forget<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        for id in ids {
            self.ids.remove(id);
            if self.anchor.as_ref() == Some(id) {
                self.anchor = None;
            }
        }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use crate::priority::Priority;

    fn task(id: &str, list: &str, position: usize) -> Task {
        Task {
            id: id.into(),
            title: id.to_string(),
            description: None,
            list_id: list.into(),
            project_id: "p1".into(),
            position,
            priority: Priority::Low,
            due_date: None,
            assignee_id: None,
            user_id: UserId::from("u1"),
            created_at: None,
            updated_at: None,
        }
    }

    fn board() -> Vec<Task> {
        // storage order differs from display order on purpose
        vec![
            task("c", "todo", 2),
            task("a", "todo", 0),
            task("d", "todo", 3),
            task("b", "todo", 1),
            task("x", "done", 0),
        ]
    }

    #[test]
    fn test_range_follows_display_order() {
        let tasks = board();
        let range = range_between(&tasks, &"d".into(), &"b".into()).unwrap();
        assert_eq!(
            range,
            vec![EntityId::from("b"), EntityId::from("c"), EntityId::from("d")]
        );
    }

    #[test]
    fn test_range_across_lists_degrades_to_single() {
        let tasks = board();
        let mut selection = Selection::new();
        selection.select_single(&"a".into());
        selection.select_range(&tasks, &"x".into());
        assert_eq!(selection.ids(), vec![EntityId::from("x")]);
    }

    #[test]
    fn test_shift_range_from_anchor() {
        let tasks = board();
        let mut selection = Selection::new();
        selection.select_single(&"a".into());
        selection.select_range(&tasks, &"c".into());
        assert_eq!(selection.len(), 3);
        assert!(!selection.contains(&"d".into()));

        // anchor stays put, so the range shrinks back toward it
        selection.select_range(&tasks, &"b".into());
        assert_eq!(
            selection.ids(),
            vec![EntityId::from("a"), EntityId::from("b")]
        );
    }

    #[test]
    fn test_toggle_and_forget() {
        let tasks = board();
        let mut selection = Selection::new();
        selection.toggle(&"a".into());
        selection.toggle(&"b".into());
        selection.toggle(&"a".into());
        assert_eq!(selection.ids(), vec![EntityId::from("b")]);

        selection.forget([&EntityId::from("b"), &EntityId::from("a")]);
        assert!(selection.is_empty());

        // the anchor went with "a", so shift-click selects one task
        selection.select_range(&tasks, &"c".into());
        assert_eq!(selection.ids(), vec![EntityId::from("c")]);
    }
}
