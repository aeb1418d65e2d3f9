use std::collections::BTreeMap;

use serde::Deserialize;

use crate::services::errors::EngineError;

/// Presented position -> selected presented option position.
pub(crate) type AnswerSnapshot = BTreeMap<usize, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CursorMove {
    Next,
    Previous,
    To(usize),
}

/// In-progress answers for one session plus the candidate's current position.
///
/// Knows only presented coordinates; the controller decides whether the
/// session still accepts input.
#[derive(Debug, Clone)]
pub(crate) struct AnswerTracker {
    option_counts: Vec<usize>,
    answers: AnswerSnapshot,
    cursor: usize,
}

impl AnswerTracker {
    pub(crate) fn new(option_counts: Vec<usize>) -> Self {
        Self { option_counts, answers: AnswerSnapshot::new(), cursor: 0 }
    }

    /// Records or overwrites the answer at `position`, returning the previous one.
    pub(crate) fn select(
        &mut self,
        position: usize,
        option_position: usize,
    ) -> Result<Option<usize>, EngineError> {
        let count = self.option_count(position)?;
        if option_position >= count {
            return Err(EngineError::InvalidOption { position, option_position, count });
        }
        Ok(self.answers.insert(position, option_position))
    }

    pub(crate) fn answer(&self, position: usize) -> Result<Option<usize>, EngineError> {
        self.option_count(position)?;
        Ok(self.answers.get(&position).copied())
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub(crate) fn snapshot(&self) -> AnswerSnapshot {
        self.answers.clone()
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves the cursor. `Next`/`Previous` stop at the ends instead of wrapping.
    pub(crate) fn navigate(&mut self, movement: CursorMove) -> Result<usize, EngineError> {
        let target = match movement {
            CursorMove::Next => (self.cursor + 1).min(self.option_counts.len().saturating_sub(1)),
            CursorMove::Previous => self.cursor.saturating_sub(1),
            CursorMove::To(position) => {
                self.option_count(position)?;
                position
            }
        };
        self.cursor = target;
        Ok(target)
    }

    fn option_count(&self, position: usize) -> Result<usize, EngineError> {
        self.option_counts
            .get(position)
            .copied()
            .ok_or(EngineError::InvalidPosition { position, count: self.option_counts.len() })
    }
}
