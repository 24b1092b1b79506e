use serde::Serialize;

/// Accumulated speech-to-text output of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    committed: String,
    interim: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provisional text with the latest partial hypothesis.
    pub fn apply_partial(&mut self, text: &str) {
        self.interim = text.trim().to_string();
    }

    /// Append a finalized segment and clear the provisional text.
    pub fn apply_committed(&mut self, text: &str) {
        let segment = text.trim();
        if !segment.is_empty() {
            if !self.committed.is_empty() {
                self.committed.push(' ');
            }
            self.committed.push_str(segment);
        }
        self.interim.clear();
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Committed text followed by the current interim text.
    pub fn display_text(&self) -> String {
        match (self.committed.is_empty(), self.interim.is_empty()) {
            (_, true) => self.committed.clone(),
            (true, false) => self.interim.clone(),
            (false, false) => format!("{} {}", self.committed, self.interim),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.interim.is_empty()
    }
}
