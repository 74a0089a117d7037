//! Test doubles shared by the unit tests: a scripted model and canned papers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::domain::Question;
use crate::error::RequestError;
use crate::gemini::{ExamModel, ModelTier};

/// Replays queued replies in order and records every prompt it was given.
/// With a gate, each reply waits for `release` before it is returned.
#[derive(Clone, Default)]
pub struct ScriptedModel {
  replies: Arc<Mutex<VecDeque<Result<String, RequestError>>>>,
  calls: Arc<Mutex<Vec<(ModelTier, String)>>>,
  gate: Option<Arc<Semaphore>>,
}

impl ScriptedModel {
  pub fn new(replies: Vec<Result<String, RequestError>>) -> Self {
    Self { replies: Arc::new(Mutex::new(replies.into())), ..Self::default() }
  }

  pub fn gated(replies: Vec<Result<String, RequestError>>) -> Self {
    Self { gate: Some(Arc::new(Semaphore::new(0))), ..Self::new(replies) }
  }

  pub fn release(&self, n: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(n);
    }
  }

  pub fn calls(&self) -> Vec<(ModelTier, String)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl ExamModel for ScriptedModel {
  async fn generate_json(&self, tier: ModelTier, prompt: &str, _schema: &Value) -> Result<String, RequestError> {
    self.calls.lock().unwrap().push((tier, prompt.to_string()));
    if let Some(gate) = &self.gate {
      gate.acquire().await.unwrap().forget();
    }
    self.replies.lock().unwrap().pop_front().unwrap_or(Err(RequestError::EmptyResponse))
  }
}

pub fn two_question_paper() -> Vec<Question> {
  serde_json::from_str(&two_question_paper_json()).unwrap()
}

/// Two questions, 70 marks in total.
pub fn two_question_paper_json() -> String {
  json!([
    {"questionNumber": "1", "questionText": "Explain recursion with an example.", "marks": 50},
    {"questionNumber": "2", "questionText": "Write a C program to reverse a string.", "marks": 20}
  ])
  .to_string()
}

/// Evaluation of `two_question_paper` with 45/70 awarded and question 2 unanswered.
pub fn evaluation_45_of_70_json() -> String {
  json!({
    "totalMarksAwarded": 45,
    "totalPossibleMarks": 70,
    "results": [
      {"questionNumber": "1", "questionText": "Explain recursion with an example.", "marks": 50,
       "userAnswer": "recursion is...", "awardedMarks": 45, "feedback": "Clear definition; add a base case example."},
      {"questionNumber": "2", "questionText": "Write a C program to reverse a string.", "marks": 20,
       "userAnswer": "Not Answered", "awardedMarks": 0, "feedback": "Attempt every question; an outline earns marks."}
    ]
  })
  .to_string()
}
