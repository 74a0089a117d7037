//! Structured-output contracts for the two model calls.
//!
//! Each contract has two halves: a schema document sent with the request
//! (Gemini `responseSchema` dialect) and a parse-then-validate function that
//! turns the raw response text into a typed value or a `SchemaViolation`.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::domain::{EvaluationResult, Question};
use crate::error::SchemaViolation;

/// Allowed drift between reported totals and the item sums.
const TOTAL_TOLERANCE: f64 = 0.01;

/// Ordered array of `{questionNumber, questionText, marks}`.
pub fn question_list_schema() -> Value {
  json!({
    "type": "ARRAY",
    "items": {
      "type": "OBJECT",
      "properties": {
        "questionNumber": {
          "type": "STRING",
          "description": "The number of the question, e.g., 'Q.1 a)' or 'Q.2 b)'"
        },
        "questionText": {
          "type": "STRING",
          "description": "The full text of the question."
        },
        "marks": {
          "type": "NUMBER",
          "description": "The marks allocated for this question."
        }
      },
      "required": ["questionNumber", "questionText", "marks"]
    }
  })
}

/// `{totalMarksAwarded, totalPossibleMarks, results[]}` with six mandatory
/// fields per result item.
pub fn evaluation_schema() -> Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "totalMarksAwarded": {
        "type": "NUMBER",
        "description": "The sum of all marks awarded to the student."
      },
      "totalPossibleMarks": {
        "type": "NUMBER",
        "description": "The sum of the maximum possible marks for all questions."
      },
      "results": {
        "type": "ARRAY",
        "items": {
          "type": "OBJECT",
          "properties": {
            "questionNumber": { "type": "STRING" },
            "questionText": { "type": "STRING" },
            "marks": { "type": "NUMBER" },
            "userAnswer": { "type": "STRING" },
            "awardedMarks": {
              "type": "NUMBER",
              "description": "Marks awarded for the student's answer."
            },
            "feedback": {
              "type": "STRING",
              "description": "Constructive feedback on the student's answer, explaining the reasoning for the awarded marks."
            }
          },
          "required": ["questionNumber", "questionText", "marks", "userAnswer", "awardedMarks", "feedback"]
        }
      }
    },
    "required": ["totalMarksAwarded", "totalPossibleMarks", "results"]
  })
}

fn parse_strict<T: DeserializeOwned>(text: &str) -> Result<T, SchemaViolation> {
  serde_json::from_str::<T>(text.trim()).map_err(|e| {
    if e.is_data() {
      SchemaViolation::Shape(e.to_string())
    } else {
      SchemaViolation::NotJson(e.to_string())
    }
  })
}

fn check_amount(question: &str, field: &'static str, value: f64) -> Result<(), SchemaViolation> {
  if value.is_finite() && value >= 0.0 {
    Ok(())
  } else {
    Err(SchemaViolation::OutOfRange { question: question.to_string(), field, value })
  }
}

fn check_total(field: &'static str, reported: f64, expected: f64) -> Result<(), SchemaViolation> {
  if !reported.is_finite() || (reported - expected).abs() > TOTAL_TOLERANCE {
    return Err(SchemaViolation::TotalMismatch { field, reported, expected });
  }
  Ok(())
}

/// Parse a generated question paper. Order is preserved as returned.
pub fn parse_question_list(text: &str) -> Result<Vec<Question>, SchemaViolation> {
  let questions: Vec<Question> = parse_strict(text)?;
  if questions.is_empty() {
    return Err(SchemaViolation::EmptyPaper);
  }

  let mut seen = HashSet::new();
  for q in &questions {
    if !(q.marks.is_finite() && q.marks > 0.0) {
      return Err(SchemaViolation::OutOfRange {
        question: q.question_number.clone(),
        field: "marks",
        value: q.marks,
      });
    }
    if !seen.insert(q.question_number.as_str()) {
      return Err(SchemaViolation::DuplicateQuestion(q.question_number.clone()));
    }
  }
  Ok(questions)
}

/// Parse an evaluation of `paper`. Each item must name a question on the paper
/// at most once and repeat that question's marks; awards must lie in
/// `0..=marks` and the totals must agree with the items.
pub fn parse_evaluation(text: &str, paper: &[Question]) -> Result<EvaluationResult, SchemaViolation> {
  let result: EvaluationResult = parse_strict(text)?;

  let paper_marks: HashMap<&str, f64> = paper.iter().map(|q| (q.question_number.as_str(), q.marks)).collect();
  let mut seen = HashSet::new();
  let mut awarded_sum = 0.0;
  let mut possible_sum = 0.0;
  for item in &result.results {
    let Some(&marks) = paper_marks.get(item.question_number.as_str()) else {
      return Err(SchemaViolation::UnknownQuestion(item.question_number.clone()));
    };
    if !seen.insert(item.question_number.as_str()) {
      return Err(SchemaViolation::DuplicateQuestion(item.question_number.clone()));
    }
    check_amount(&item.question_number, "marks", item.marks)?;
    check_amount(&item.question_number, "awardedMarks", item.awarded_marks)?;
    if (item.marks - marks).abs() > TOTAL_TOLERANCE {
      return Err(SchemaViolation::MarksMismatch {
        question: item.question_number.clone(),
        reported: item.marks,
        expected: marks,
      });
    }
    if item.awarded_marks > marks + TOTAL_TOLERANCE {
      return Err(SchemaViolation::AwardExceedsMarks {
        question: item.question_number.clone(),
        awarded: item.awarded_marks,
        marks,
      });
    }
    awarded_sum += item.awarded_marks;
    possible_sum += marks;
  }

  check_total("totalMarksAwarded", result.total_marks_awarded, awarded_sum)?;
  check_total("totalPossibleMarks", result.total_possible_marks, possible_sum)?;
  Ok(result)
}
