use serde::Serialize;

use crate::services::answer_tracker::AnswerSnapshot;
use crate::services::errors::EngineError;
use crate::services::question_bank::QuestionBank;
use crate::services::randomization::PresentationMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Score {
    pub(crate) correct_count: u32,
    pub(crate) total_questions: u32,
}

impl Score {
    pub(crate) fn percent(&self) -> Result<u32, EngineError> {
        percent_round_half_up(self.correct_count, self.total_questions)
    }
}

/// Grades a snapshot against the canonical answer key.
///
/// Every recorded answer is translated back through the presentation's
/// permutation before comparison; option text is never compared. Unanswered
/// or unresolvable positions count as incorrect.
pub(crate) fn score(
    bank: &QuestionBank,
    presentation: &PresentationMap,
    answers: &AnswerSnapshot,
) -> Result<Score, EngineError> {
    if presentation.is_empty() {
        return Err(EngineError::EmptyExam);
    }

    let mut correct_count = 0u32;
    for (position, entry) in presentation.entries().iter().enumerate() {
        let question = bank.get(&entry.original_question_id)?;

        let Some(option_position) = answers.get(&position).copied() else {
            continue;
        };
        let canonical = match presentation.canonical_option(position, option_position) {
            Ok((_, canonical)) => canonical,
            Err(err) => {
                tracing::warn!(
                    position,
                    question_id = %entry.original_question_id,
                    error = %err,
                    "Recorded answer has no canonical option; counting as incorrect"
                );
                continue;
            }
        };

        if canonical == question.correct_option_index {
            correct_count += 1;
        }
    }

    Ok(Score { correct_count, total_questions: presentation.len() as u32 })
}

/// `round(correct / total * 100)` with halves rounded up, in exact integer math.
pub(crate) fn percent_round_half_up(correct: u32, total: u32) -> Result<u32, EngineError> {
    if total == 0 {
        return Err(EngineError::EmptyExam);
    }
    let numerator = 2 * 100 * u64::from(correct) + u64::from(total);
    let denominator = 2 * u64::from(total);
    Ok((numerator / denominator) as u32)
}
