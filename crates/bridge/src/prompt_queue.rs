//! At most one pending initial prompt per session name

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct PromptQueue {
    pending: DashMap<String, String>,
}

impl PromptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `text` for `name`, replacing any prompt not yet consumed.
    /// Returns true when an earlier prompt was overwritten.
    pub fn queue(&self, name: &str, text: &str) -> bool {
        self.pending
            .insert(name.to_string(), text.to_string())
            .is_some()
    }

    /// Consume the pending prompt for `name`. Yields it at most once.
    pub fn take(&self, name: &str) -> Option<String> {
        self.pending.remove(name).map(|(_, text)| text)
    }

    pub fn remove(&self, name: &str) {
        self.pending.remove(name);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_prompt_overwrites_earlier() {
        let queue = PromptQueue::new();
        assert!(!queue.queue("s1", "X"));
        assert!(queue.queue("s1", "Y"));
        assert_eq!(queue.take("s1").as_deref(), Some("Y"));
        assert_eq!(queue.take("s1"), None);
    }

    #[test]
    fn names_are_independent() {
        let queue = PromptQueue::new();
        queue.queue("a", "for a");
        queue.queue("b", "for b");
        queue.remove("a");
        assert!(!queue.contains("a"));
        assert_eq!(queue.take("b").as_deref(), Some("for b"));
    }
}
