//! The two model-backed requests of an exam session.
//!
//!   - generating a question paper for a scheme + subject
//!   - evaluating the user's answers against that paper
//!
//! Both build a prompt, make exactly one structured-output call and run the
//! response through the schema contracts. No retries, no partial results.

use tracing::{debug, error, info, instrument};

use crate::config::{PaperConfig, Prompts};
use crate::domain::{Answers, EvaluationResult, Question, StudentAnswer, SubjectInfo, BOARD, NOT_ANSWERED};
use crate::error::RequestError;
use crate::gemini::{ExamModel, ModelTier};
use crate::schema::{evaluation_schema, parse_evaluation, parse_question_list, question_list_schema};
use crate::util::{fill_template, trunc_for_log};

pub fn generation_prompt(prompts: &Prompts, paper: &PaperConfig, info: &SubjectInfo) -> String {
  let total = paper.total_marks.to_string();
  let min = paper.min_questions.to_string();
  let max = paper.max_questions.to_string();
  fill_template(
    &prompts.generation_template,
    &[
      ("board", BOARD),
      ("scheme", info.scheme.label()),
      ("subject", info.subject.trim()),
      ("total_marks", &total),
      ("min_questions", &min),
      ("max_questions", &max),
    ],
  )
}

/// Pair every question with the user's answer, in paper order.
pub fn student_paper(questions: &[Question], answers: &Answers) -> Vec<StudentAnswer> {
  questions
    .iter()
    .map(|q| {
      let user_answer = answers
        .get(&q.question_number)
        .filter(|a| !a.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| NOT_ANSWERED.to_string());
      StudentAnswer {
        question_number: q.question_number.clone(),
        question_text: q.question_text.clone(),
        marks: q.marks,
        user_answer,
      }
    })
    .collect()
}

pub fn evaluation_prompt(prompts: &Prompts, sheet: &[StudentAnswer]) -> String {
  // Serializing plain strings and f64s cannot fail.
  let paper_json = serde_json::to_string_pretty(sheet).unwrap_or_default();
  fill_template(&prompts.evaluation_template, &[("board", BOARD), ("student_paper", &paper_json)])
}

/// Ask the model for a fresh paper.
#[instrument(level = "info", skip_all, fields(scheme = %info.scheme, subject = %info.subject))]
pub async fn generate_question_paper(
  model: &dyn ExamModel,
  prompts: &Prompts,
  paper: &PaperConfig,
  info: &SubjectInfo,
) -> Result<Vec<Question>, RequestError> {
  let prompt = generation_prompt(prompts, paper, info);
  let text = model.generate_json(ModelTier::Fast, &prompt, &question_list_schema()).await?;

  match parse_question_list(&text) {
    Ok(questions) => {
      let total: f64 = questions.iter().map(|q| q.marks).sum();
      info!(target: "exam", count = questions.len(), total_marks = total, "Question paper generated");
      if total != f64::from(paper.total_marks) {
        debug!(target: "exam", expected = paper.total_marks, actual = total, "Paper total differs from requested budget");
      }
      Ok(questions)
    }
    Err(violation) => {
      error!(target: "exam", %violation, response = %trunc_for_log(&text, 200), "Failed to parse question paper");
      Err(violation.into())
    }
  }
}

/// Ask the model to grade `answers` against `questions`, all in one call.
#[instrument(level = "info", skip_all, fields(questions = questions.len()))]
pub async fn evaluate_answers(
  model: &dyn ExamModel,
  prompts: &Prompts,
  questions: &[Question],
  answers: &Answers,
) -> Result<EvaluationResult, RequestError> {
  let sheet = student_paper(questions, answers);
  let unanswered = sheet.iter().filter(|s| s.user_answer == NOT_ANSWERED).count();
  debug!(target: "exam", unanswered, "Student paper assembled");

  let prompt = evaluation_prompt(prompts, &sheet);
  let text = model.generate_json(ModelTier::Strong, &prompt, &evaluation_schema()).await?;

  match parse_evaluation(&text, questions) {
    Ok(result) => {
      info!(target: "exam", awarded = result.total_marks_awarded, possible = result.total_possible_marks, "Answers evaluated");
      Ok(result)
    }
    Err(violation) => {
      error!(target: "exam", %violation, response = %trunc_for_log(&text, 200), "Failed to parse evaluation");
      Err(violation.into())
    }
  }
}
