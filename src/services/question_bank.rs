use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::services::errors::EngineError;

/// An authored multiple-choice question. `correct_option_index` points into
/// `options` in authored (canonical) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct_option_index: usize,
}

impl Question {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.options.is_empty() {
            return Err(EngineError::InvalidQuestion {
                id: self.id.clone(),
                reason: "question has no options".to_string(),
            });
        }
        if self.correct_option_index >= self.options.len() {
            return Err(EngineError::InvalidQuestion {
                id: self.id.clone(),
                reason: format!(
                    "correct option {} is outside {} options",
                    self.correct_option_index,
                    self.options.len()
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExamDefinition {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) duration_seconds: u32,
    pub(crate) question_ids: Vec<String>,
    pub(crate) presented_question_count: usize,
}

impl ExamDefinition {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.duration_seconds == 0 {
            return Err(EngineError::InvalidExamDefinition {
                id: self.id.clone(),
                reason: "duration must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Read-only question set for one exam. Shared between every session of that
/// exam, so nothing hands out mutable access.
#[derive(Debug, Clone, Default)]
pub(crate) struct QuestionBank {
    questions: HashMap<String, Question>,
}

impl QuestionBank {
    pub(crate) fn new(questions: Vec<Question>) -> Result<Self, EngineError> {
        let mut by_id = HashMap::with_capacity(questions.len());
        for question in questions {
            question.validate()?;
            let id = question.id.clone();
            if by_id.insert(id.clone(), question).is_some() {
                return Err(EngineError::InvalidQuestion {
                    id,
                    reason: "duplicate question id".to_string(),
                });
            }
        }
        Ok(Self { questions: by_id })
    }

    pub(crate) fn get(&self, id: &str) -> Result<&Question, EngineError> {
        self.questions.get(id).ok_or_else(|| EngineError::UnknownQuestion(id.to_string()))
    }

    pub(crate) fn len(&self) -> usize {
        self.questions.len()
    }
}
