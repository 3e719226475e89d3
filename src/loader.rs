//! Quiz definition loading.
//!
//! A quiz file is a static question bank plus the room id it boots under.
//! It is read at startup and again on every admin reset; the coordinator
//! never mutates it.

use serde::Deserialize;
use std::path::Path;

use crate::error::{GameError, Result};
use crate::types::Question;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDefinition {
    pub room_id: String,
    pub questions: Vec<Question>,
}

/// Read and validate a quiz definition file.
pub async fn load_quiz_file(path: &Path) -> Result<QuizDefinition> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| GameError::Storage(e.into()))?;
    let quiz: QuizDefinition = serde_json::from_slice(&bytes)
        .map_err(|e| GameError::Validation(format!("Malformed quiz file: {e}")))?;
    validate(&quiz)?;
    tracing::info!(
        path = %path.display(),
        room = %quiz.room_id,
        questions = quiz.questions.len(),
        "quiz definition loaded"
    );
    Ok(quiz)
}

fn validate(quiz: &QuizDefinition) -> Result<()> {
    if quiz.room_id.trim().is_empty() {
        return Err(GameError::validation("Quiz file is missing a room id"));
    }
    if quiz.questions.is_empty() {
        return Err(GameError::validation("Quiz file contains no questions"));
    }
    if let Some(bad) = quiz.questions.iter().find(|q| !q.is_well_formed()) {
        return Err(GameError::Validation(format!(
            "Malformed question '{}': four options and a correct index in range are required",
            bad.text
        )));
    }
    Ok(())
}
