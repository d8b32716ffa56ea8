use log::info;

use crate::registry::{is_source_letter, LetterCounts};
use crate::store::{LetterInstance, SceneStore};

/// Text entry in front of the store: caps typed letters to what the walls can
/// still supply and keeps a log of submitted commands.
#[derive(Debug, Clone, Default)]
pub struct CommandIntake {
    capacity: LetterCounts,
    pending: String,
    log: Vec<String>,
}

impl CommandIntake {
    pub fn new(capacity: LetterCounts) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> &LetterCounts {
        &self.capacity
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Uppercases letters in `value` and keeps each one only while the letters
    /// already `used` plus those kept so far stay below its wall capacity.
    /// Everything that is not a letter passes through.
    pub fn cap_input(&self, value: &str, used: &LetterCounts) -> String {
        let mut pending = LetterCounts::new();
        let mut capped = String::with_capacity(value.len());
        for ch in value.chars() {
            let upper = ch.to_ascii_uppercase();
            if !is_source_letter(upper) {
                capped.push(ch);
                continue;
            }
            let limit = self.capacity.get(&upper).copied().unwrap_or(0);
            let taken = used.get(&upper).copied().unwrap_or(0);
            let queued = pending.entry(upper).or_default();
            if taken + *queued < limit {
                *queued += 1;
                capped.push(upper);
            }
        }
        capped
    }

    /// Replaces the pending input with its capped form.
    pub fn set_input(&mut self, value: &str, used: &LetterCounts) -> &str {
        self.pending = self.cap_input(value, used);
        &self.pending
    }

    /// Sends the pending input to the store. Blank input is ignored.
    pub fn submit(&mut self, store: &mut SceneStore) -> Vec<LetterInstance> {
        let command = self.pending.trim().to_string();
        self.pending.clear();
        if command.is_empty() {
            return Vec::new();
        }
        info!("command submitted: {command}");
        let created = store.add_letters(&command.to_ascii_uppercase());
        self.log.push(command);
        created
    }

    /// Sends `text` straight to the store without capping it here.
    pub fn submit_uncapped(&mut self, text: &str, store: &mut SceneStore) -> Vec<LetterInstance> {
        let command = text.trim();
        if command.is_empty() {
            return Vec::new();
        }
        info!("uncapped command submitted: {command}");
        self.log.push(command.to_string());
        store.add_letters(&command.to_ascii_uppercase())
    }
}
