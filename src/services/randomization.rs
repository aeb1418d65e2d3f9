use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::errors::EngineError;
use crate::services::question_bank::{ExamDefinition, QuestionBank};

/// Non-fatal conditions noticed while deriving a presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum EngineWarning {
    ClampedQuestionCount { requested: usize, available: usize },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClampedQuestionCount { requested, available } => write!(
                f,
                "exam requests {requested} questions but only {available} exist; using {available}"
            ),
        }
    }
}

#[derive(Debug, Error)]
#[error("option order {0:?} is not a permutation")]
pub(crate) struct InvalidPermutation(Vec<usize>);

/// Presented option position -> canonical option index for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub(crate) struct OptionPermutation {
    canonical_by_presented: Vec<usize>,
}

impl OptionPermutation {
    /// Fisher-Yates over `0..len`.
    pub(crate) fn shuffled<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let mut canonical_by_presented: Vec<usize> = (0..len).collect();
        canonical_by_presented.shuffle(rng);
        Self { canonical_by_presented }
    }

    pub(crate) fn len(&self) -> usize {
        self.canonical_by_presented.len()
    }

    pub(crate) fn canonical_index(&self, presented_position: usize) -> Option<usize> {
        self.canonical_by_presented.get(presented_position).copied()
    }

    pub(crate) fn presented_position(&self, canonical_index: usize) -> Option<usize> {
        self.canonical_by_presented.iter().position(|index| *index == canonical_index)
    }

    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.canonical_by_presented
    }
}

impl TryFrom<Vec<usize>> for OptionPermutation {
    type Error = InvalidPermutation;

    fn try_from(canonical_by_presented: Vec<usize>) -> Result<Self, Self::Error> {
        let candidate = Self { canonical_by_presented };
        let len = candidate.len();
        let invertible = candidate.canonical_by_presented.iter().all(|index| *index < len)
            && (0..len).all(|index| candidate.presented_position(index).is_some());
        if invertible {
            Ok(candidate)
        } else {
            Err(InvalidPermutation(candidate.canonical_by_presented))
        }
    }
}

impl From<OptionPermutation> for Vec<usize> {
    fn from(value: OptionPermutation) -> Self {
        value.canonical_by_presented
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PresentedEntry {
    pub(crate) original_question_id: String,
    pub(crate) presented_option_order: OptionPermutation,
}

/// The per-session link between presented and canonical identities.
///
/// Position `p` of the map is the `p`-th question the candidate sees; its
/// permutation turns a presented option position back into the authored index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct PresentationMap {
    entries: Vec<PresentedEntry>,
}

impl PresentationMap {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[PresentedEntry] {
        &self.entries
    }

    pub(crate) fn entry(&self, position: usize) -> Result<&PresentedEntry, EngineError> {
        self.entries
            .get(position)
            .ok_or(EngineError::InvalidPosition { position, count: self.entries.len() })
    }

    /// Resolves a presented `(position, option_position)` to the canonical
    /// `(question_id, option_index)`.
    pub(crate) fn canonical_option(
        &self,
        position: usize,
        option_position: usize,
    ) -> Result<(&str, usize), EngineError> {
        let entry = self.entry(position)?;
        let canonical = entry.presented_option_order.canonical_index(option_position).ok_or(
            EngineError::InvalidOption {
                position,
                option_position,
                count: entry.presented_option_order.len(),
            },
        )?;
        Ok((entry.original_question_id.as_str(), canonical))
    }

    pub(crate) fn option_counts(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.presented_option_order.len()).collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Presentation {
    pub(crate) map: PresentationMap,
    pub(crate) warnings: Vec<EngineWarning>,
}

/// Picks and orders the questions one candidate will see, and shuffles each
/// question's options. Reads the bank only to learn option counts.
pub(crate) fn derive_presentation<R: Rng + ?Sized>(
    exam: &ExamDefinition,
    bank: &QuestionBank,
    rng: &mut R,
) -> Result<Presentation, EngineError> {
    exam.validate()?;

    let available = exam.question_ids.len();
    let requested = exam.presented_question_count;
    let mut warnings = Vec::new();

    let count = if requested > available {
        tracing::warn!(
            exam_id = %exam.id,
            requested,
            available,
            "Clamping presented question count"
        );
        metrics::counter!("question_count_clamped_total").increment(1);
        warnings.push(EngineWarning::ClampedQuestionCount { requested, available });
        available
    } else {
        requested
    };

    if count == 0 {
        return Err(EngineError::EmptyExam);
    }

    let mut candidates: Vec<&String> = exam.question_ids.iter().collect();
    let (chosen, _) = candidates.partial_shuffle(rng, count);

    let mut entries = Vec::with_capacity(count);
    for question_id in chosen.iter() {
        let question = bank.get(question_id)?;
        entries.push(PresentedEntry {
            original_question_id: question.id.clone(),
            presented_option_order: OptionPermutation::shuffled(question.options.len(), rng),
        });
    }

    Ok(Presentation { map: PresentationMap { entries }, warnings })
}
