//! Error types: startup configuration, model requests, response validation and
//! rejected session intents.

use thiserror::Error;

use crate::session::PhaseKind;

/// Problems that keep the backend from starting at all.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
  #[error("no model credential configured (set GEMINI_API_KEY or API_KEY)")]
  MissingCredential,
  #[error("invalid value {value:?} for {var}")]
  InvalidValue { var: &'static str, value: String },
  #[error("failed to build HTTP client: {0}")]
  HttpClient(#[source] reqwest::Error),
}

/// A model response that does not honour the requested structure.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum SchemaViolation {
  #[error("response is not JSON: {0}")]
  NotJson(String),
  #[error("response does not match the schema: {0}")]
  Shape(String),
  #[error("question paper has no questions")]
  EmptyPaper,
  #[error("question number {0:?} appears more than once")]
  DuplicateQuestion(String),
  #[error("{field} for {question:?} is out of range: {value}")]
  OutOfRange { question: String, field: &'static str, value: f64 },
  #[error("awarded {awarded} exceeds the {marks} marks available for {question:?}")]
  AwardExceedsMarks { question: String, awarded: f64, marks: f64 },
  #[error("marks for {question:?} reported as {reported} but the paper gives {expected}")]
  MarksMismatch { question: String, reported: f64, expected: f64 },
  #[error("{field} is {reported} but the items add up to {expected}")]
  TotalMismatch { field: &'static str, reported: f64, expected: f64 },
  #[error("result refers to question {0:?} which is not on the paper")]
  UnknownQuestion(String),
}

/// Any failure of a generation or evaluation call. The session collapses all
/// of these into one "request failed" outcome; the detail is for logs only.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),
  #[error("model request failed with status {status}: {message}")]
  HttpStatus { status: reqwest::StatusCode, message: String },
  #[error("model returned no text")]
  EmptyResponse,
  #[error("malformed model response: {0}")]
  Malformed(#[from] SchemaViolation),
}

/// An intent the session refused. State is left untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntentError {
  #[error("cannot {intent} while {phase}")]
  WrongPhase { intent: &'static str, phase: PhaseKind },
  #[error("subject must not be empty")]
  BlankSubject,
  #[error("question {0:?} is not on this paper")]
  UnknownQuestion(String),
}
