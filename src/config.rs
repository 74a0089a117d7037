//! Loading agent configuration (prompt templates + paper constraints) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `PaperConfig` for the expected schema.
//! Everything here is optional; a missing or broken file means defaults.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub paper: PaperConfig,
}

/// Shape every generated paper is asked to have.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
  pub total_marks: u32,
  pub min_questions: u32,
  pub max_questions: u32,
}

impl Default for PaperConfig {
  fn default() -> Self {
    Self { total_marks: 70, min_questions: 10, max_questions: 15 }
  }
}

/// Prompt templates. Placeholders are `{name}` and filled by `fill_template`.
///
/// generation: `{board}`, `{scheme}`, `{subject}`, `{total_marks}`,
/// `{min_questions}`, `{max_questions}`.
/// evaluation: `{board}`, `{student_paper}` (pretty JSON).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_template: String,
  pub evaluation_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_template: "Act as an expert on the {board} curriculum. Generate a comprehensive model question paper for the subject: \"{subject}\" under the \"{scheme}\" scheme.
The paper should strictly follow the official {board} format and marking scheme.
- The total marks for the paper should be {total_marks}.
- Include a variety of question types (e.g., short answer, long answer, diagrams if applicable).
- Ensure questions are distributed across different cognitive levels (Remember, Understand, Apply).
- Structure the questions with clear numbering (e.g., Q.1, Q.2 a), etc.).
- Generate around {min_questions}-{max_questions} questions covering the syllabus.
Return the result as a JSON array.".into(),
      evaluation_template: "You are an expert {board} examiner. Evaluate the following student's answers for the given question paper.
For each question, compare the student's answer with the expected correct answer based on the {board} syllabus.
Provide marks for each answer based on its accuracy, completeness, and correctness, never exceeding the marks allocated for the question. Also, provide brief, constructive feedback for each answer.
Finally, calculate the total score.

Here is the paper with student's answers:
{student_paper}

Return the complete evaluation in the specified JSON format. Ensure the feedback is encouraging and helpful for the student's improvement.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "mockpaper_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mockpaper_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mockpaper_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}
