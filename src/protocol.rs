//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{
    score_percent, Answers, EvaluationResult, EvaluationResultItem, Question, Scheme, ScoreBand,
    SubjectInfo, BOARD, NOT_ANSWERED,
};
use crate::session::{PhaseKind, Session};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Setup {
        scheme: Scheme,
        subject: String,
    },
    Answer {
        #[serde(rename = "questionNumber")]
        question_number: String,
        text: String,
    },
    Submit {
        #[serde(default)]
        answers: Option<Answers>,
    },
    Restart,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session { session: SessionOut },
    Error { message: String },
}

/// Snapshot of the session for the presentation surfaces.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub phase: PhaseKind,
    pub generation: u64,
    pub board: &'static str,
    pub subject: Option<SubjectInfo>,
    pub questions: Vec<Question>,
    pub answers: Answers,
    pub evaluation: Option<EvaluationOut>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOut {
    pub total_marks_awarded: f64,
    pub total_possible_marks: f64,
    pub score_percent: f64,
    pub band: ScoreBand,
    pub results: Vec<ResultItemOut>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItemOut {
    #[serde(flatten)]
    pub item: EvaluationResultItem,
    pub band: ScoreBand,
}

/// Convert the live `Session` to the public DTO.
pub fn session_out(s: &Session) -> SessionOut {
    SessionOut {
        phase: s.kind(),
        generation: s.generation(),
        board: BOARD,
        subject: s.subject().cloned(),
        questions: s.questions().to_vec(),
        answers: s.answers().cloned().unwrap_or_default(),
        evaluation: s.evaluation().map(evaluation_out),
        error: s.last_error().map(str::to_string),
    }
}

fn evaluation_out(r: &EvaluationResult) -> EvaluationOut {
    let percent = score_percent(r.total_marks_awarded, r.total_possible_marks);
    let results = r
        .results
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if item.user_answer.trim().is_empty() {
                item.user_answer = NOT_ANSWERED.to_string();
            }
            let band = ScoreBand::for_percent(score_percent(item.awarded_marks, item.marks));
            ResultItemOut { item, band }
        })
        .collect();
    EvaluationOut {
        total_marks_awarded: r.total_marks_awarded,
        total_possible_marks: r.total_possible_marks,
        score_percent: percent,
        band: ScoreBand::for_percent(percent),
        results,
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    #[serde(rename = "questionNumber")]
    pub question_number: String,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitIn {
    #[serde(default)]
    pub answers: Option<Answers>,
}

#[derive(Serialize)]
pub struct SchemesOut {
    pub board: &'static str,
    pub schemes: Vec<&'static str>,
    pub default: &'static str,
}

impl SchemesOut {
    pub fn current() -> Self {
        Self {
            board: BOARD,
            schemes: Scheme::ALL.iter().map(|s| s.label()).collect(),
            default: Scheme::default().label(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
