use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::display::{format_local_time, DisplayRow, NewsBoard};
use crate::refresh::Refresher;

pub struct AppState {
    pub board: Arc<NewsBoard>,
    pub refresher: Arc<Refresher>,
    pub local_offset: FixedOffset,
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub rows: Vec<DisplayRow>,
    pub last_published: Option<String>,
    pub refreshing: bool,
}

#[derive(Template)]
#[template(path = "rows.html")]
pub struct RowsTemplate {
    pub rows: Vec<DisplayRow>,
}

#[derive(Template)]
#[template(path = "refresh_button.html")]
pub struct RefreshButtonTemplate {
    pub refreshing: bool,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/rows", get(rows))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Route handlers
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rows = state.board.snapshot().await;
    let last_published = state
        .board
        .last_published()
        .await
        .map(|at| format_local_time(at, state.local_offset));

    HtmlTemplate(IndexTemplate {
        rows,
        last_published,
        refreshing: state.refresher.is_refreshing(),
    })
}

pub async fn rows(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(RowsTemplate {
        rows: state.board.snapshot().await,
    })
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let refresher = state.refresher.clone();
    tokio::spawn(async move {
        refresher.try_refresh().await;
    });

    // Return refreshing state immediately
    HtmlTemplate(RefreshButtonTemplate { refreshing: true })
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(RefreshButtonTemplate {
        refreshing: state.refresher.is_refreshing(),
    })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
