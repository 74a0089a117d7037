//! The exam session state machine.
//!
//! One `Session` per process. It moves through
//!
//!   Setup -> Generating -> TakingExam -> Evaluating -> Results -> (restart) Setup
//!
//! and never performs I/O itself: submitting an intent hands back a job
//! describing the model call to make, and the caller feeds the outcome back
//! through `complete_generation` / `complete_evaluation` together with the
//! job's `Ticket`. Every submit and every restart bumps the session generation,
//! so an outcome whose ticket no longer matches is dropped as stale.

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{blank_answers, Answers, EvaluationResult, Question, SubjectInfo};
use crate::error::{IntentError, RequestError};

pub const GENERATION_FAILED: &str = "Failed to generate the question paper. Please try again.";
pub const EVALUATION_FAILED: &str = "Failed to evaluate the answers. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
  Setup,
  Generating,
  TakingExam,
  Evaluating,
  Results,
}

impl std::fmt::Display for PhaseKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      PhaseKind::Setup => "in setup",
      PhaseKind::Generating => "generating a paper",
      PhaseKind::TakingExam => "taking the exam",
      PhaseKind::Evaluating => "evaluating answers",
      PhaseKind::Results => "showing results",
    })
  }
}

/// A generated paper and the user's work on it.
#[derive(Clone, Debug, PartialEq)]
pub struct Exam {
  pub subject: SubjectInfo,
  pub questions: Vec<Question>,
  pub answers: Answers,
}

/// Phase plus the data that only exists in that phase.
#[derive(Clone, Debug, PartialEq)]
pub enum Phase {
  /// `last_subject` survives a failed generation so the form can be refilled.
  Setup { last_subject: Option<SubjectInfo> },
  Generating { subject: SubjectInfo },
  TakingExam { exam: Exam },
  Evaluating { exam: Exam },
  Results { exam: Exam, result: EvaluationResult },
}

impl Phase {
  fn initial() -> Self {
    Phase::Setup { last_subject: None }
  }

  pub fn kind(&self) -> PhaseKind {
    match self {
      Phase::Setup { .. } => PhaseKind::Setup,
      Phase::Generating { .. } => PhaseKind::Generating,
      Phase::TakingExam { .. } => PhaseKind::TakingExam,
      Phase::Evaluating { .. } => PhaseKind::Evaluating,
      Phase::Results { .. } => PhaseKind::Results,
    }
  }
}

/// Identifies the request a completion belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
  generation: u64,
  /// Correlates the request in logs.
  pub attempt: Uuid,
}

#[derive(Clone, Debug)]
pub struct GenerationJob {
  pub ticket: Ticket,
  pub subject: SubjectInfo,
}

#[derive(Clone, Debug)]
pub struct EvaluationJob {
  pub ticket: Ticket,
  pub questions: Vec<Question>,
  pub answers: Answers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
  /// The outcome was applied and the session is now in this phase.
  Applied(PhaseKind),
  /// The outcome belonged to an abandoned request and was dropped.
  Stale,
}

#[derive(Debug)]
pub struct Session {
  generation: u64,
  phase: Phase,
  last_error: Option<String>,
}

impl Default for Session {
  fn default() -> Self {
    Self::new()
  }
}

impl Session {
  pub fn new() -> Self {
    Self { generation: 0, phase: Phase::initial(), last_error: None }
  }

  #[cfg(test)]
  pub fn phase(&self) -> &Phase {
    &self.phase
  }

  pub fn kind(&self) -> PhaseKind {
    self.phase.kind()
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn subject(&self) -> Option<&SubjectInfo> {
    match &self.phase {
      Phase::Setup { last_subject } => last_subject.as_ref(),
      Phase::Generating { subject } => Some(subject),
      Phase::TakingExam { exam } | Phase::Evaluating { exam } | Phase::Results { exam, .. } => Some(&exam.subject),
    }
  }

  pub fn exam(&self) -> Option<&Exam> {
    match &self.phase {
      Phase::TakingExam { exam } | Phase::Evaluating { exam } | Phase::Results { exam, .. } => Some(exam),
      Phase::Setup { .. } | Phase::Generating { .. } => None,
    }
  }

  pub fn questions(&self) -> &[Question] {
    self.exam().map(|e| e.questions.as_slice()).unwrap_or_default()
  }

  pub fn answers(&self) -> Option<&Answers> {
    self.exam().map(|e| &e.answers)
  }

  pub fn evaluation(&self) -> Option<&EvaluationResult> {
    match &self.phase {
      Phase::Results { result, .. } => Some(result),
      _ => None,
    }
  }

  fn next_ticket(&mut self) -> Ticket {
    self.generation += 1;
    Ticket { generation: self.generation, attempt: Uuid::new_v4() }
  }

  fn wrong_phase(&self, intent: &'static str) -> IntentError {
    IntentError::WrongPhase { intent, phase: self.kind() }
  }

  /// Setup -> Generating.
  pub fn submit_setup(&mut self, info: SubjectInfo) -> Result<GenerationJob, IntentError> {
    if self.kind() != PhaseKind::Setup {
      return Err(self.wrong_phase("submit a subject"));
    }
    let subject = info.subject.trim();
    if subject.is_empty() {
      return Err(IntentError::BlankSubject);
    }
    let info = SubjectInfo { scheme: info.scheme, subject: subject.to_string() };

    let ticket = self.next_ticket();
    self.last_error = None;
    self.phase = Phase::Generating { subject: info.clone() };
    info!(target: "exam", attempt = %ticket.attempt, scheme = %info.scheme, subject = %info.subject, "Generating paper");
    Ok(GenerationJob { ticket, subject: info })
  }

  /// Generating -> TakingExam on success, Generating -> Setup on failure.
  pub fn complete_generation(
    &mut self,
    ticket: Ticket,
    outcome: Result<Vec<Question>, RequestError>,
  ) -> Completion {
    if ticket.generation != self.generation {
      warn!(target: "exam", attempt = %ticket.attempt, "Dropping stale generation result");
      return Completion::Stale;
    }
    match (std::mem::replace(&mut self.phase, Phase::initial()), outcome) {
      (Phase::Generating { subject }, Ok(questions)) => {
        let answers = blank_answers(&questions);
        info!(target: "exam", attempt = %ticket.attempt, questions = questions.len(), "Exam started");
        self.phase = Phase::TakingExam { exam: Exam { subject, questions, answers } };
      }
      (Phase::Generating { subject }, Err(e)) => {
        error!(target: "exam", attempt = %ticket.attempt, error = %e, "Paper generation failed");
        self.last_error = Some(GENERATION_FAILED.to_string());
        self.phase = Phase::Setup { last_subject: Some(subject) };
      }
      (other, _) => {
        self.phase = other;
        warn!(target: "exam", attempt = %ticket.attempt, phase = %self.kind(), "Dropping generation result outside generating phase");
        return Completion::Stale;
      }
    }
    Completion::Applied(self.kind())
  }

  /// Edit one answer while taking the exam.
  pub fn update_answer(&mut self, question_number: &str, text: String) -> Result<(), IntentError> {
    let phase = self.kind();
    let Phase::TakingExam { exam } = &mut self.phase else {
      return Err(IntentError::WrongPhase { intent: "edit an answer", phase });
    };
    match exam.answers.get_mut(question_number) {
      Some(slot) => {
        *slot = text;
        Ok(())
      }
      None => Err(IntentError::UnknownQuestion(question_number.to_string())),
    }
  }

  /// TakingExam -> Evaluating with the current answers.
  pub fn submit_answers(&mut self) -> Result<EvaluationJob, IntentError> {
    if self.kind() != PhaseKind::TakingExam {
      return Err(self.wrong_phase("submit answers"));
    }
    let ticket = self.next_ticket();
    let Phase::TakingExam { exam } = std::mem::replace(&mut self.phase, Phase::initial()) else {
      return Err(self.wrong_phase("submit answers"));
    };
    let job = EvaluationJob { ticket, questions: exam.questions.clone(), answers: exam.answers.clone() };
    self.last_error = None;
    self.phase = Phase::Evaluating { exam };
    info!(target: "exam", attempt = %ticket.attempt, "Evaluating answers");
    Ok(job)
  }

  /// Replace the answers wholesale, then submit. Any unknown key rejects the
  /// whole submission and leaves the sheet as it was.
  pub fn submit_answer_sheet(&mut self, sheet: Answers) -> Result<EvaluationJob, IntentError> {
    let phase = self.kind();
    let Phase::TakingExam { exam } = &mut self.phase else {
      return Err(IntentError::WrongPhase { intent: "submit answers", phase });
    };
    if let Some(unknown) = sheet.keys().find(|k| !exam.answers.contains_key(*k)) {
      return Err(IntentError::UnknownQuestion(unknown.clone()));
    }
    for (number, text) in sheet {
      exam.answers.insert(number, text);
    }
    self.submit_answers()
  }

  /// Evaluating -> Results on success, Evaluating -> TakingExam on failure.
  pub fn complete_evaluation(
    &mut self,
    ticket: Ticket,
    outcome: Result<EvaluationResult, RequestError>,
  ) -> Completion {
    if ticket.generation != self.generation {
      warn!(target: "exam", attempt = %ticket.attempt, "Dropping stale evaluation result");
      return Completion::Stale;
    }
    match (std::mem::replace(&mut self.phase, Phase::initial()), outcome) {
      (Phase::Evaluating { exam }, Ok(result)) => {
        info!(target: "exam", attempt = %ticket.attempt, awarded = result.total_marks_awarded, possible = result.total_possible_marks, "Results ready");
        self.phase = Phase::Results { exam, result };
      }
      (Phase::Evaluating { exam }, Err(e)) => {
        error!(target: "exam", attempt = %ticket.attempt, error = %e, "Evaluation failed");
        self.last_error = Some(EVALUATION_FAILED.to_string());
        self.phase = Phase::TakingExam { exam };
      }
      (other, _) => {
        self.phase = other;
        warn!(target: "exam", attempt = %ticket.attempt, phase = %self.kind(), "Dropping evaluation result outside evaluating phase");
        return Completion::Stale;
      }
    }
    Completion::Applied(self.kind())
  }

  /// Back to a clean Setup from any phase. Any in-flight request becomes stale.
  pub fn restart(&mut self) {
    self.generation += 1;
    self.phase = Phase::initial();
    self.last_error = None;
    info!(target: "exam", generation = self.generation, "Session restarted");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Scheme;
  use crate::error::SchemaViolation;
  use crate::testing::two_question_paper;

  fn c_programming() -> SubjectInfo {
    SubjectInfo { scheme: Scheme::I, subject: "Programming in C".into() }
  }

  fn malformed() -> RequestError {
    RequestError::Malformed(SchemaViolation::NotJson("expected value".into()))
  }

  fn taking_exam() -> Session {
    let mut s = Session::new();
    let job = s.submit_setup(c_programming()).unwrap();
    assert_eq!(s.complete_generation(job.ticket, Ok(two_question_paper())), Completion::Applied(PhaseKind::TakingExam));
    s
  }

  fn sample_result() -> EvaluationResult {
    serde_json::from_str(&crate::testing::evaluation_45_of_70_json()).unwrap()
  }

  #[test]
  fn starts_in_empty_setup() {
    let s = Session::new();
    assert_eq!(s.kind(), PhaseKind::Setup);
    assert!(s.questions().is_empty());
    assert!(s.answers().is_none());
    assert!(s.evaluation().is_none());
    assert!(s.last_error().is_none());
  }

  #[test]
  fn successful_generation_initialises_blank_answers() {
    let s = taking_exam();
    assert_eq!(s.questions().len(), 2);
    let answers = s.answers().unwrap();
    assert_eq!(answers.len(), 2);
    assert!(answers.values().all(String::is_empty));
    assert_eq!(answers.keys().cloned().collect::<Vec<_>>(), vec!["1", "2"]);
  }

  #[test]
  fn blank_subject_is_rejected_without_transition() {
    let mut s = Session::new();
    let err = s.submit_setup(SubjectInfo { scheme: Scheme::K, subject: "   ".into() }).unwrap_err();
    assert_eq!(err, IntentError::BlankSubject);
    assert_eq!(s.kind(), PhaseKind::Setup);
    assert_eq!(s.generation(), 0);
  }

  #[test]
  fn failed_generation_returns_to_setup_keeping_subject() {
    let mut s = Session::new();
    let job = s.submit_setup(c_programming()).unwrap();
    assert_eq!(s.complete_generation(job.ticket, Err(malformed())), Completion::Applied(PhaseKind::Setup));
    assert_eq!(s.last_error(), Some(GENERATION_FAILED));
    assert!(s.questions().is_empty());
    assert_eq!(s.subject(), Some(&c_programming()));

    // Retrying clears the error.
    let _ = s.submit_setup(c_programming()).unwrap();
    assert!(s.last_error().is_none());
  }

  #[test]
  fn intents_out_of_phase_are_rejected() {
    let mut s = Session::new();
    let _job = s.submit_setup(c_programming()).unwrap();
    assert!(matches!(
      s.submit_setup(c_programming()),
      Err(IntentError::WrongPhase { phase: PhaseKind::Generating, .. })
    ));
    assert!(matches!(s.submit_answers(), Err(IntentError::WrongPhase { .. })));
    assert!(matches!(s.update_answer("1", "x".into()), Err(IntentError::WrongPhase { .. })));
    assert_eq!(s.kind(), PhaseKind::Generating);
  }

  #[test]
  fn update_answer_rejects_unknown_question() {
    let mut s = taking_exam();
    s.update_answer("1", "recursion is...".into()).unwrap();
    assert_eq!(s.update_answer("9", "?".into()), Err(IntentError::UnknownQuestion("9".into())));
    assert_eq!(s.answers().unwrap()["1"], "recursion is...");
  }

  #[test]
  fn failed_evaluation_keeps_submitted_answers() {
    let mut s = taking_exam();
    s.update_answer("1", "recursion is...".into()).unwrap();
    let before = s.answers().unwrap().clone();

    let job = s.submit_answers().unwrap();
    assert_eq!(job.answers, before);
    assert_eq!(s.kind(), PhaseKind::Evaluating);
    assert!(matches!(s.update_answer("2", "late".into()), Err(IntentError::WrongPhase { .. })));

    assert_eq!(s.complete_evaluation(job.ticket, Err(malformed())), Completion::Applied(PhaseKind::TakingExam));
    assert_eq!(s.answers(), Some(&before));
    assert_eq!(s.last_error(), Some(EVALUATION_FAILED));
    assert!(s.evaluation().is_none());
  }

  #[test]
  fn successful_evaluation_shows_results() {
    let mut s = taking_exam();
    let job = s.submit_answers().unwrap();
    assert_eq!(s.complete_evaluation(job.ticket, Ok(sample_result())), Completion::Applied(PhaseKind::Results));
    assert_eq!(s.evaluation().unwrap().total_marks_awarded, 45.0);
  }

  #[test]
  fn answer_sheet_with_unknown_key_is_rejected_whole() {
    let mut s = taking_exam();
    let mut sheet = Answers::new();
    sheet.insert("1".into(), "changed".into());
    sheet.insert("7".into(), "bogus".into());
    assert_eq!(s.submit_answer_sheet(sheet).unwrap_err(), IntentError::UnknownQuestion("7".into()));
    assert_eq!(s.kind(), PhaseKind::TakingExam);
    assert_eq!(s.answers().unwrap()["1"], "");

    let mut sheet = Answers::new();
    sheet.insert("2".into(), "char *s".into());
    let job = s.submit_answer_sheet(sheet).unwrap();
    assert_eq!(job.answers["2"], "char *s");
    assert_eq!(job.answers["1"], "");
  }

  #[test]
  fn restart_from_any_phase_clears_everything() {
    let mut s = taking_exam();
    let job = s.submit_answers().unwrap();
    s.complete_evaluation(job.ticket, Ok(sample_result()));
    s.restart();
    assert_eq!(s.phase(), &Phase::Setup { last_subject: None });
    assert!(s.questions().is_empty());
    assert!(s.evaluation().is_none());

    let mut s = Session::new();
    let _ = s.submit_setup(c_programming()).unwrap();
    s.restart();
    assert_eq!(s.kind(), PhaseKind::Setup);
    assert!(s.subject().is_none());
  }

  #[test]
  fn completion_after_restart_is_stale() {
    let mut s = Session::new();
    let old = s.submit_setup(c_programming()).unwrap();
    s.restart();
    let fresh = s.submit_setup(SubjectInfo { scheme: Scheme::G, subject: "Digital Techniques".into() }).unwrap();

    assert_eq!(s.complete_generation(old.ticket, Ok(two_question_paper())), Completion::Stale);
    assert_eq!(s.kind(), PhaseKind::Generating);
    assert_eq!(s.subject().unwrap().subject, "Digital Techniques");

    assert_eq!(s.complete_generation(fresh.ticket, Err(malformed())), Completion::Applied(PhaseKind::Setup));
  }

  #[test]
  fn stale_evaluation_does_not_touch_new_session() {
    let mut s = taking_exam();
    let job = s.submit_answers().unwrap();
    s.restart();
    assert_eq!(s.complete_evaluation(job.ticket, Ok(sample_result())), Completion::Stale);
    assert_eq!(s.phase(), &Phase::Setup { last_subject: None });
  }

  #[test]
  fn completion_of_the_wrong_kind_is_dropped() {
    let mut s = taking_exam();
    let job = s.submit_answers().unwrap();
    assert_eq!(s.complete_generation(job.ticket, Ok(two_question_paper())), Completion::Stale);
    assert_eq!(s.kind(), PhaseKind::Evaluating);
  }
}
