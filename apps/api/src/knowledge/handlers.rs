use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::knowledge::{AnswerSource, KnowledgeEntry, QuestionCategory};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddKnowledgeRequest {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: Option<QuestionCategory>,
}

/// GET /api/v1/knowledge/:user_id
pub async fn handle_list_knowledge(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<KnowledgeEntry>>, AppError> {
    let entries = state
        .knowledge
        .entries(user_id)
        .await?;
    Ok(Json(entries))
}

/// POST /api/v1/knowledge/:user_id
pub async fn handle_add_knowledge(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AddKnowledgeRequest>,
) -> Result<StatusCode, AppError> {
    if req.question.trim().is_empty() || req.answer.trim().is_empty() {
        return Err(AppError::Validation(
            "question and answer cannot be empty".to_string(),
        ));
    }
    state
        .knowledge
        .add_entry(
            user_id,
            &req.question,
            req.answer.trim(),
            req.category,
            AnswerSource::UserInput,
        )
        .await?;
    Ok(StatusCode::CREATED)
}
