use crate::llm::{Role, Turn};

/// Turn history of one answer session, bounded by a character budget.
///
/// The first turn is the system turn and is never evicted. Before a turn
/// is added, the oldest other turns are dropped until the new one fits or
/// only the system turn is left.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
    budget: usize,
    len: usize,
}

impl Transcript {
    pub fn new(system: impl Into<String>, budget: usize) -> Self {
        let system = Turn::system(system);
        let len = system.char_len();
        Self {
            turns: vec![system],
            budget,
            len,
        }
    }

    /// Append a turn, evicting as needed. Returns how many turns were evicted.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> usize {
        let turn = Turn::new(role, content);
        let incoming = turn.char_len();

        let mut evicted = 0;
        while self.len + incoming > self.budget && self.turns.len() > 1 {
            let dropped = self.turns.remove(1);
            self.len -= dropped.char_len();
            evicted += 1;
        }
        if evicted > 0 {
            log::debug!(
                "Evicted {} turns to fit {} chars (budget {})",
                evicted,
                incoming,
                self.budget
            );
        }

        self.len += incoming;
        self.turns.push(turn);
        evicted
    }

    /// Total characters across all turns.
    pub fn char_len(&self) -> usize {
        self.len
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}
