// src/services/scoring.rs
//
// Pure scoring computation. No I/O: callers load the questions and the
// recorded selections, this module derives correctness and percentages.

use std::collections::HashMap;

use crate::models::question::QuestionWithAlternatives;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedQuestion {
    pub question_id: i64,
    pub correct: bool,
}

#[derive(Debug, Clone)]
pub struct ScoreReport {
    pub graded: Vec<GradedQuestion>,
    pub correct_count: usize,
    pub total_questions: usize,
    pub percentage: f64,
}

impl ScoreReport {
    /// Ids of the questions answered incorrectly, including unanswered
    /// ones, in question order.
    pub fn wrong_question_ids(&self) -> Vec<i64> {
        self.graded
            .iter()
            .filter(|g| !g.correct)
            .map(|g| g.question_id)
            .collect()
    }

    pub fn is_correct(&self, question_id: i64) -> bool {
        self.graded
            .iter()
            .any(|g| g.question_id == question_id && g.correct)
    }
}

/// Resolves the id of the alternative matching the question's correct key.
///
/// None when the key is unset or matches no alternative. Such questions
/// still count in the total and grade incorrect: a data-integrity fallback,
/// never a silent exclusion.
pub fn correct_alternative_id(question: &QuestionWithAlternatives) -> Option<i64> {
    let key = question.question.correct_alternative_key.as_deref()?;
    question
        .alternatives
        .iter()
        .find(|a| a.key == key)
        .map(|a| a.id)
}

/// Grades every question against the recorded selections.
/// An unanswered question grades incorrect, never "pending".
pub fn grade(
    questions: &[QuestionWithAlternatives],
    selections: &HashMap<i64, Option<i64>>,
) -> ScoreReport {
    let mut graded = Vec::with_capacity(questions.len());
    let mut correct_count = 0;

    for q in questions {
        let selected = selections.get(&q.question.id).copied().flatten();
        let correct = match (correct_alternative_id(q), selected) {
            (Some(correct_id), Some(selected_id)) => correct_id == selected_id,
            _ => false,
        };
        if correct {
            correct_count += 1;
        }
        graded.push(GradedQuestion {
            question_id: q.question.id,
            correct,
        });
    }

    let total_questions = questions.len();
    ScoreReport {
        graded,
        correct_count,
        total_questions,
        percentage: percentage(correct_count, total_questions),
    }
}

/// Percentage of correct answers, rounded to the nearest whole point.
/// Defined as 0 for an empty question set.
pub fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (correct as f64 / total as f64 * 100.0).round()
}

/// Number of correct answers recovered from a recorded percentage.
pub fn correct_from_percentage(percentage: f64, total: i64) -> i64 {
    (percentage / 100.0 * total as f64).round() as i64
}
