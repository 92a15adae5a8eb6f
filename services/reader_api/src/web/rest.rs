//! services/reader_api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use reading_session_core::domain::{EbookId, ReadingProgress};
use reading_session_core::settings::{
    FontFamily, ReaderSettings, Theme, FONT_OPTIONS, FONT_SIZE_OPTIONS, LINE_HEIGHT_OPTIONS,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(get_progress_handler, reader_options_handler),
    components(schemas(ProgressResponse, ReaderOptionsResponse, ThemeOption)),
    tags(
        (name = "Ebook Reader API", description = "Reading progress and display options for the in-browser reader.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

/// The reader's saved position in one ebook.
#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct ProgressResponse {
    ebook_id: i64,
    location: String,
    progress_percentage: f64,
    last_read_at: DateTime<Utc>,
}

impl From<ReadingProgress> for ProgressResponse {
    fn from(progress: ReadingProgress) -> Self {
        Self {
            ebook_id: progress.ebook_id,
            location: progress.location.into_inner(),
            progress_percentage: progress.progress_percentage,
            last_read_at: progress.last_read_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ThemeOption {
    name: String,
    background: String,
    color: String,
}

/// Everything the settings panel offers.
#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReaderOptionsResponse {
    font_sizes: Vec<u8>,
    font_families: Vec<String>,
    line_heights: Vec<f64>,
    themes: Vec<ThemeOption>,
    #[schema(value_type = Object)]
    defaults: ReaderSettings,
}

impl ReaderOptionsResponse {
    pub fn current() -> Self {
        Self {
            font_sizes: FONT_SIZE_OPTIONS.to_vec(),
            font_families: FONT_OPTIONS.iter().map(|f| FontFamily::name(*f).to_string()).collect(),
            line_heights: LINE_HEIGHT_OPTIONS.to_vec(),
            themes: Theme::ALL
                .iter()
                .map(|theme| {
                    let colors = theme.colors();
                    ThemeOption {
                        name: theme.name().to_string(),
                        background: colors.background.to_string(),
                        color: colors.color.to_string(),
                    }
                })
                .collect(),
            defaults: ReaderSettings::default(),
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get the signed-in reader's saved position in an ebook.
#[utoipa::path(
    get,
    path = "/progress/{ebook_id}",
    params(("ebook_id" = i64, Path, description = "The ebook's catalog id.")),
    responses(
        (status = 200, description = "Saved reading position", body = ProgressResponse),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "The reader has not opened this ebook yet"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(ebook_id): Path<EbookId>,
) -> Result<Json<ProgressResponse>, (StatusCode, String)> {
    match app_state.progress.fetch(user_id, ebook_id).await {
        Ok(Some(progress)) => Ok(Json(progress.into())),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            "No reading progress for this ebook".to_string(),
        )),
        Err(e) => {
            error!(%user_id, ebook_id, "Failed to fetch progress: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch progress".to_string(),
            ))
        }
    }
}

/// List the font sizes, fonts, line heights and themes the reader supports.
#[utoipa::path(
    get,
    path = "/reader/options",
    responses((status = 200, description = "Supported display options", body = ReaderOptionsResponse))
)]
pub async fn reader_options_handler() -> Json<ReaderOptionsResponse> {
    Json(ReaderOptionsResponse::current())
}
