//! Domain models: curriculum scheme, subject, generated questions, answers and
//! the evaluation returned by the examiner model.
//!
//! Field names on the wire are camelCase because the same structs are used as
//! the model's structured-output contract and as the browser payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The examination board every paper is modelled on.
pub const BOARD: &str = "MSBTE";

/// Stands in for a missing or blank answer, both in the paper sent to the
/// examiner and on the results screen.
pub const NOT_ANSWERED: &str = "Not Answered";

/// Curriculum revision the paper is generated for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
  #[default]
  #[serde(rename = "I-Scheme")]
  I,
  #[serde(rename = "G-Scheme")]
  G,
  #[serde(rename = "K-Scheme")]
  K,
  #[serde(rename = "E-Scheme")]
  E,
}

impl Scheme {
  pub const ALL: [Scheme; 4] = [Scheme::I, Scheme::G, Scheme::K, Scheme::E];

  pub fn label(self) -> &'static str {
    match self {
      Scheme::I => "I-Scheme",
      Scheme::G => "G-Scheme",
      Scheme::K => "K-Scheme",
      Scheme::E => "E-Scheme",
    }
  }
}

impl std::fmt::Display for Scheme {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.label())
  }
}

/// What the user asked a paper for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
  pub scheme: Scheme,
  /// Free text or a course code, e.g. "Programming in C" or "22226".
  pub subject: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  /// Free-form label such as "Q.1 a)"; kept in paper order, never re-sorted.
  pub question_number: String,
  pub question_text: String,
  pub marks: f64,
}

/// questionNumber -> answer text.
pub type Answers = BTreeMap<String, String>;

/// One line of the paper as sent to the examiner.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnswer {
  pub question_number: String,
  pub question_text: String,
  pub marks: f64,
  pub user_answer: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResultItem {
  pub question_number: String,
  pub question_text: String,
  pub marks: f64,
  pub user_answer: String,
  pub awarded_marks: f64,
  pub feedback: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
  pub total_marks_awarded: f64,
  pub total_possible_marks: f64,
  pub results: Vec<EvaluationResultItem>,
}

/// Coarse score band used by the results screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
  Good,
  Fair,
  Poor,
}

/// Percentage of `awarded` out of `possible`; 0 when nothing was possible.
pub fn score_percent(awarded: f64, possible: f64) -> f64 {
  if possible > 0.0 { awarded / possible * 100.0 } else { 0.0 }
}

impl ScoreBand {
  pub fn for_percent(percent: f64) -> Self {
    if percent >= 75.0 {
      ScoreBand::Good
    } else if percent >= 40.0 {
      ScoreBand::Fair
    } else {
      ScoreBand::Poor
    }
  }
}

/// Fresh answer sheet: one empty entry per question number.
pub fn blank_answers(questions: &[Question]) -> Answers {
  questions
    .iter()
    .map(|q| (q.question_number.clone(), String::new()))
    .collect()
}
