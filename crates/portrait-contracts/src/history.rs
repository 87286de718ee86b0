use crate::artifact::Artifact;

/// State recorded just before a generation request was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub artifact: Option<Artifact>,
    pub prompt: String,
}

/// Append-only undo chain for one editing session. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStack {
    entries: Vec<HistoryEntry>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_snapshot(&mut self, artifact: Option<Artifact>, prompt: impl Into<String>) {
        self.entries.push(HistoryEntry {
            artifact,
            prompt: prompt.into(),
        });
    }

    /// Removes the most recent snapshot; `None` means there is nothing to undo.
    pub fn pop_snapshot(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_returns_entries_newest_first() {
        let mut history = HistoryStack::new();
        let first = Artifact::from_data_url("data:image/png;base64,AAAA");
        history.push_snapshot(None, "P0");
        history.push_snapshot(Some(first.clone()), "P1");
        assert_eq!(history.len(), 2);

        let top = history.pop_snapshot().unwrap();
        assert_eq!(top.artifact, Some(first));
        assert_eq!(top.prompt, "P1");
        let next = history.pop_snapshot().unwrap();
        assert_eq!(next.artifact, None);
        assert_eq!(next.prompt, "P0");
    }

    #[test]
    fn pop_on_empty_stack_reports_nothing_to_undo() {
        let mut history = HistoryStack::new();
        assert!(history.pop_snapshot().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn clear_empties_the_chain() {
        let mut history = HistoryStack::new();
        history.push_snapshot(None, "a");
        history.push_snapshot(None, "b");
        history.clear();
        assert!(history.is_empty());
        assert!(history.entries().is_empty());
    }
}
