//! Ordered mirror list with user priority and runtime failover

use patchline_manifest::UpdateMirror;
use tracing::{debug, info};

/// Ordered set of update mirrors plus the failover cursor.
///
/// The list is loaded once at initialization and reordered only by the
/// user. At runtime the orchestrator walks the cursor forward on each
/// connection failure; falling off the end wraps the cursor back to the
/// first mirror and reports exhaustion.
#[derive(Debug, Clone, Default)]
pub struct MirrorList {
    mirrors: Vec<UpdateMirror>,
    current: usize,
}

impl MirrorList {
    /// Create a list from the configured default ordering
    pub fn new(mirrors: Vec<UpdateMirror>) -> Self {
        Self {
            mirrors,
            current: 0,
        }
    }

    /// Rewrite the ordering from a user's preferred mirror *names*:
    /// prioritized mirrors first, preserving the user's order, followed by
    /// the remaining defaults in their original order. Unknown names are
    /// ignored. The failover cursor returns to the front.
    pub fn apply_user_priority(&mut self, names: &[String]) {
        let mut prioritized = Vec::new();
        for name in names {
            if let Some(pos) = self.mirrors.iter().position(|m| &m.name == name) {
                prioritized.push(self.mirrors.remove(pos));
            }
        }
        if !prioritized.is_empty() {
            debug!("user mirror priority: {prioritized:?}");
        }
        prioritized.append(&mut self.mirrors);
        self.mirrors = prioritized;
        self.current = 0;
    }

    /// Swap a mirror with its predecessor; silent no-op out of range
    pub fn move_up(&mut self, index: usize) {
        if index == 0 || index >= self.mirrors.len() {
            return;
        }
        self.mirrors.swap(index - 1, index);
    }

    /// Swap a mirror with its successor; silent no-op out of range
    pub fn move_down(&mut self, index: usize) {
        if self.mirrors.len() < 2 || index >= self.mirrors.len() - 1 {
            return;
        }
        self.mirrors.swap(index, index + 1);
    }

    /// The mirror the cursor points at
    pub fn current(&self) -> Option<&UpdateMirror> {
        self.mirrors.get(self.current)
    }

    /// Position of the failover cursor
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Advance the cursor to the next mirror. Returns `false` when the
    /// cursor fell off the end; it then points at the first mirror again
    /// and the caller surfaces a cannot-connect failure.
    pub fn advance(&mut self) -> bool {
        self.current += 1;
        if self.current >= self.mirrors.len() {
            info!("all {} mirrors exhausted", self.mirrors.len());
            self.current = 0;
            return false;
        }
        true
    }

    /// All mirrors in their current order
    pub fn mirrors(&self) -> &[UpdateMirror] {
        &self.mirrors
    }

    /// Number of mirrors
    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    /// Whether no mirrors are configured
    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> MirrorList {
        MirrorList::new(vec![
            UpdateMirror::new("http://a.example/", "Alpha", "EU"),
            UpdateMirror::new("http://b.example/", "Beta", "NA"),
            UpdateMirror::new("http://c.example/", "Gamma", "AS"),
        ])
    }

    fn names(list: &MirrorList) -> Vec<&str> {
        list.mirrors().iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn user_priority_rewrites_order() {
        let mut list = sample();
        list.apply_user_priority(&["Gamma".to_string(), "Unknown".to_string()]);
        assert_eq!(names(&list), vec!["Gamma", "Alpha", "Beta"]);
        assert_eq!(list.current_index(), 0);
    }

    #[test]
    fn move_up_and_down_are_bounded() {
        let mut list = sample();
        list.move_up(0);
        list.move_down(2);
        list.move_down(99);
        assert_eq!(names(&list), vec!["Alpha", "Beta", "Gamma"]);

        list.move_up(2);
        assert_eq!(names(&list), vec!["Alpha", "Gamma", "Beta"]);
        list.move_down(0);
        assert_eq!(names(&list), vec!["Gamma", "Alpha", "Beta"]);
    }

    #[test]
    fn advance_wraps_and_reports_exhaustion() {
        let mut list = sample();
        assert!(list.advance());
        assert!(list.advance());
        assert_eq!(list.current_index(), 2);
        assert!(!list.advance());
        assert_eq!(list.current_index(), 0);
    }

    #[test]
    fn empty_list_has_no_current() {
        let mut list = MirrorList::default();
        assert!(list.current().is_none());
        assert!(!list.advance());
    }
}
