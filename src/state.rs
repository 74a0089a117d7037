//! Application state: the live exam session, the model client and prompts.
//!
//! This module owns:
//!   - the single `Session` (behind an async mutex; every mutation is one lock scope)
//!   - the model used for generation and evaluation
//!   - prompts and paper constraints (from TOML or defaults)
//!   - a watch channel carrying the latest `SessionOut` for WebSocket clients
//!
//! Model calls run in spawned tasks outside the lock; their outcome is fed back
//! to the session, which drops it if the session moved on in the meantime.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, instrument, Instrument};

use crate::config::{load_agent_config_from_env, AgentConfig, PaperConfig, Prompts};
use crate::domain::{Answers, SubjectInfo};
use crate::error::{ConfigError, IntentError};
use crate::gemini::{ExamModel, Gemini};
use crate::paper::{evaluate_answers, generate_question_paper};
use crate::protocol::{session_out, SessionOut};
use crate::session::{Completion, EvaluationJob, GenerationJob, Session};

pub struct AppState {
    session: Mutex<Session>,
    model: Arc<dyn ExamModel>,
    pub prompts: Prompts,
    pub paper: PaperConfig,
    updates: watch::Sender<SessionOut>,
}

/// Accepted intent: the snapshot right after the transition plus the task
/// that will apply the model's outcome.
pub struct Submitted {
    pub session: SessionOut,
    pub completion: JoinHandle<Completion>,
}

impl Submitted {
    /// Let the model task finish on its own; a panic in it is logged.
    pub fn detach(self) -> SessionOut {
        let completion = self.completion;
        tokio::spawn(async move {
            if let Err(e) = completion.await {
                error!(target: "exam", error = %e, "Model task aborted");
            }
        });
        self.session
    }
}

impl AppState {
    /// Build state from env: load optional TOML config and the Gemini client.
    /// Fails only when the model credential is missing or invalid.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        let gemini = Gemini::from_env()?;
        info!(target: "mockpaper_backend", base_url = %gemini.base_url, fast_model = %gemini.fast_model, strong_model = %gemini.strong_model, timeout = ?gemini.timeout, "Gemini enabled.");
        info!(target: "mockpaper_backend", total_marks = cfg.paper.total_marks, min_questions = cfg.paper.min_questions, max_questions = cfg.paper.max_questions, "Paper constraints");
        Ok(Self::new(Arc::new(gemini), cfg))
    }

    pub fn new(model: Arc<dyn ExamModel>, cfg: AgentConfig) -> Self {
        let session = Session::new();
        let (updates, _) = watch::channel(session_out(&session));
        Self {
            session: Mutex::new(session),
            model,
            prompts: cfg.prompts,
            paper: cfg.paper,
            updates,
        }
    }

    pub async fn view(&self) -> SessionOut {
        session_out(&*self.session.lock().await)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionOut> {
        self.updates.subscribe()
    }

    fn publish(&self, session: &Session) -> SessionOut {
        let out = session_out(session);
        self.updates.send_replace(out.clone());
        out
    }

    #[instrument(level = "info", skip(self), fields(scheme = %info.scheme))]
    pub async fn submit_setup(self: &Arc<Self>, info: SubjectInfo) -> Result<Submitted, IntentError> {
        let mut session = self.session.lock().await;
        let job = session.submit_setup(info)?;
        let out = self.publish(&session);
        drop(session);
        Ok(Submitted { session: out, completion: self.spawn_generation(job) })
    }

    pub async fn update_answer(&self, question_number: &str, text: String) -> Result<SessionOut, IntentError> {
        let mut session = self.session.lock().await;
        session.update_answer(question_number, text)?;
        Ok(self.publish(&session))
    }

    /// Submit the current answers, or `sheet` when the client sends the whole form.
    #[instrument(level = "info", skip_all, fields(with_sheet = sheet.is_some()))]
    pub async fn submit_answers(self: &Arc<Self>, sheet: Option<Answers>) -> Result<Submitted, IntentError> {
        let mut session = self.session.lock().await;
        let job = match sheet {
            Some(sheet) => session.submit_answer_sheet(sheet)?,
            None => session.submit_answers()?,
        };
        let out = self.publish(&session);
        drop(session);
        Ok(Submitted { session: out, completion: self.spawn_evaluation(job) })
    }

    #[instrument(level = "info", skip(self))]
    pub async fn restart(&self) -> SessionOut {
        let mut session = self.session.lock().await;
        session.restart();
        self.publish(&session)
    }

    fn spawn_generation(self: &Arc<Self>, job: GenerationJob) -> JoinHandle<Completion> {
        let state = Arc::clone(self);
        let span = info_span!("generation", attempt = %job.ticket.attempt);
        tokio::spawn(
            async move {
                let outcome =
                    generate_question_paper(state.model.as_ref(), &state.prompts, &state.paper, &job.subject).await;
                let mut session = state.session.lock().await;
                let completion = session.complete_generation(job.ticket, outcome);
                if completion != Completion::Stale {
                    state.publish(&session);
                }
                completion
            }
            .instrument(span),
        )
    }

    fn spawn_evaluation(self: &Arc<Self>, job: EvaluationJob) -> JoinHandle<Completion> {
        let state = Arc::clone(self);
        let span = info_span!("evaluation", attempt = %job.ticket.attempt);
        tokio::spawn(
            async move {
                let outcome =
                    evaluate_answers(state.model.as_ref(), &state.prompts, &job.questions, &job.answers).await;
                let mut session = state.session.lock().await;
                let completion = session.complete_evaluation(job.ticket, outcome);
                if completion != Completion::Stale {
                    state.publish(&session);
                }
                completion
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Scheme, NOT_ANSWERED};
    use crate::session::{PhaseKind, EVALUATION_FAILED, GENERATION_FAILED};
    use crate::testing::{evaluation_45_of_70_json, two_question_paper_json, ScriptedModel};

    fn state_with(model: ScriptedModel) -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(model), AgentConfig::default()))
    }

    fn i_scheme_c() -> SubjectInfo {
        SubjectInfo { scheme: Scheme::I, subject: "Programming in C".into() }
    }

    #[tokio::test]
    async fn scenario_a_generation_starts_exam() {
        let state = state_with(ScriptedModel::new(vec![Ok(two_question_paper_json())]));
        let submitted = state.submit_setup(i_scheme_c()).await.unwrap();
        assert_eq!(submitted.session.phase, PhaseKind::Generating);

        assert_eq!(submitted.completion.await.unwrap(), Completion::Applied(PhaseKind::TakingExam));
        let view = state.view().await;
        assert_eq!(view.phase, PhaseKind::TakingExam);
        assert_eq!(view.questions.iter().map(|q| q.marks).sum::<f64>(), 70.0);
        let expected: Answers = [("1".to_string(), String::new()), ("2".to_string(), String::new())].into();
        assert_eq!(view.answers, expected);
    }

    #[tokio::test]
    async fn scenario_b_evaluation_shows_results() {
        let model = ScriptedModel::new(vec![Ok(two_question_paper_json()), Ok(evaluation_45_of_70_json())]);
        let state = state_with(model.clone());
        state.submit_setup(i_scheme_c()).await.unwrap().completion.await.unwrap();
        state.update_answer("1", "recursion is...".into()).await.unwrap();

        let submitted = state.submit_answers(None).await.unwrap();
        assert_eq!(submitted.session.phase, PhaseKind::Evaluating);
        assert_eq!(submitted.completion.await.unwrap(), Completion::Applied(PhaseKind::Results));

        let view = state.view().await;
        let evaluation = view.evaluation.unwrap();
        assert_eq!((evaluation.total_marks_awarded, evaluation.total_possible_marks), (45.0, 70.0));
        assert_eq!(evaluation.results.len(), 2);
        assert_eq!(evaluation.results[1].item.user_answer, NOT_ANSWERED);

        let grading_prompt = &model.calls()[1].1;
        assert!(grading_prompt.contains("recursion is..."));
        assert!(grading_prompt.contains(NOT_ANSWERED));
    }

    #[tokio::test]
    async fn scenario_c_non_json_generation_returns_to_setup() {
        let state = state_with(ScriptedModel::new(vec![Ok("Here is your paper: Q1 ...".into())]));
        let submitted = state.submit_setup(i_scheme_c()).await.unwrap();
        assert_eq!(submitted.completion.await.unwrap(), Completion::Applied(PhaseKind::Setup));

        let view = state.view().await;
        assert_eq!(view.phase, PhaseKind::Setup);
        assert_eq!(view.error.as_deref(), Some(GENERATION_FAILED));
        assert!(view.questions.is_empty());
        assert_eq!(view.subject, Some(i_scheme_c()));
    }

    #[tokio::test]
    async fn scenario_d_missing_total_returns_to_exam_with_answers() {
        let bad = r#"{"totalMarksAwarded": 45, "results": []}"#.to_string();
        let state = state_with(ScriptedModel::new(vec![Ok(two_question_paper_json()), Ok(bad)]));
        state.submit_setup(i_scheme_c()).await.unwrap().completion.await.unwrap();
        state.update_answer("1", "recursion is...".into()).await.unwrap();
        let before = state.view().await.answers;

        let submitted = state.submit_answers(None).await.unwrap();
        assert_eq!(submitted.completion.await.unwrap(), Completion::Applied(PhaseKind::TakingExam));

        let view = state.view().await;
        assert_eq!(view.phase, PhaseKind::TakingExam);
        assert_eq!(view.answers, before);
        assert_eq!(view.error.as_deref(), Some(EVALUATION_FAILED));
        assert!(view.evaluation.is_none());
    }

    #[tokio::test]
    async fn second_setup_while_generating_is_rejected() {
        let model = ScriptedModel::gated(vec![Ok(two_question_paper_json())]);
        let state = state_with(model.clone());
        let first = state.submit_setup(i_scheme_c()).await.unwrap();
        let err = state.submit_setup(i_scheme_c()).await.err().unwrap();
        assert!(matches!(err, IntentError::WrongPhase { phase: PhaseKind::Generating, .. }));

        model.release(1);
        assert_eq!(first.completion.await.unwrap(), Completion::Applied(PhaseKind::TakingExam));
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn restart_mid_flight_discards_late_result() {
        let model = ScriptedModel::gated(vec![Ok(two_question_paper_json())]);
        let state = state_with(model.clone());
        let mut updates = state.subscribe();

        let submitted = state.submit_setup(i_scheme_c()).await.unwrap();
        let restarted = state.restart().await;
        assert_eq!(restarted.phase, PhaseKind::Setup);
        assert!(restarted.subject.is_none());

        model.release(1);
        assert_eq!(submitted.completion.await.unwrap(), Completion::Stale);
        let view = state.view().await;
        assert_eq!(view.phase, PhaseKind::Setup);
        assert!(view.questions.is_empty());
        assert_eq!(updates.borrow_and_update().phase, PhaseKind::Setup);
    }

    #[tokio::test]
    async fn submitted_sheet_is_applied_before_evaluation() {
        let model = ScriptedModel::new(vec![Ok(two_question_paper_json()), Ok(evaluation_45_of_70_json())]);
        let state = state_with(model.clone());
        state.submit_setup(i_scheme_c()).await.unwrap().completion.await.unwrap();

        let sheet: Answers = [("1".to_string(), "recursion is...".to_string())].into();
        let submitted = state.submit_answers(Some(sheet)).await.unwrap();
        assert_eq!(submitted.session.answers["1"], "recursion is...");
        submitted.completion.await.unwrap();
        assert!(model.calls()[1].1.contains("recursion is..."));
    }

    #[tokio::test]
    async fn detached_generation_still_lands() {
        let state = state_with(ScriptedModel::new(vec![Ok(two_question_paper_json())]));
        let mut updates = state.subscribe();
        let out = state.submit_setup(i_scheme_c()).await.unwrap().detach();
        assert_eq!(out.phase, PhaseKind::Generating);

        let in_exam = updates.wait_for(|s| s.phase == PhaseKind::TakingExam);
        tokio::time::timeout(std::time::Duration::from_secs(5), in_exam)
            .await
            .expect("generation did not finish")
            .unwrap();
    }
}
