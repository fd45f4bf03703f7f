//! Auto-grading of multiple-choice answers.
//!
//! Grading is an exact, case-sensitive string comparison against the canonical
//! answer. Descriptive questions count towards `total_questions` only and are
//! left for manual review.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::models::Question;
use crate::db::types::QuestionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub(crate) struct GradeSummary {
    pub(crate) score: i32,
    pub(crate) total_auto_graded: i32,
    pub(crate) total_questions: i32,
}

/// One row of the submission detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct AnswerReview {
    pub(crate) question_id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Option<Vec<String>>,
    pub(crate) canonical_answer: String,
    pub(crate) answer: Option<String>,
    /// `None` for descriptive questions.
    pub(crate) correct: Option<bool>,
}

fn is_correct(question: &Question, answers: &BTreeMap<String, String>) -> bool {
    answers.get(&question.id).is_some_and(|answer| *answer == question.canonical_answer)
}

pub(crate) fn grade(questions: &[Question], answers: &BTreeMap<String, String>) -> GradeSummary {
    questions.iter().fold(GradeSummary::default(), |mut summary, question| {
        summary.total_questions += 1;
        if question.kind.is_auto_graded() {
            summary.total_auto_graded += 1;
            if is_correct(question, answers) {
                summary.score += 1;
            }
        }
        summary
    })
}

pub(crate) fn review(
    questions: &[Question],
    answers: &BTreeMap<String, String>,
) -> Vec<AnswerReview> {
    questions
        .iter()
        .map(|question| AnswerReview {
            question_id: question.id.clone(),
            kind: question.kind,
            prompt: question.prompt.clone(),
            options: question.options.as_ref().map(|options| options.0.clone()),
            canonical_answer: question.canonical_answer.clone(),
            answer: answers.get(&question.id).cloned(),
            correct: question.kind.is_auto_graded().then(|| is_correct(question, answers)),
        })
        .collect()
}
