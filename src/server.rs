//! HTTP host for a labelling session
//!
//! - `GET  /health`    server status
//! - `GET  /session`   title, statistics and every point
//! - `POST /select`    lasso boundary -> selected indices
//! - `POST /label`     label the given indices or the current selection
//! - `POST /colour`    switch colour strategy
//! - `POST /highlight` colour by presence of chosen features
//! - `POST /rank`      top features correlated with the selection
//! - `POST /save`      write the labelled CSV

use crate::geometry::Lasso;
use crate::ml::correlation::DEFAULT_TOP_K;
use crate::session::Session;
use crate::structs::{
    ColourStrategy, FeatureScore, LabelStatistics, LassoError, Notification, Result,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Address the session server binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 5006,
        }
    }
}

/// Session plus a lock held across each save, so writes land in request order
struct AppState {
    session: Mutex<Session>,
    saving: Mutex<()>,
}

impl AppState {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            saving: Mutex::new(()),
        }
    }
}

type SharedState = Arc<AppState>;

// ── Errors ────────────────────────────────────────────────────────────────

struct ApiError(LassoError);

impl From<LassoError> for ApiError {
    fn from(e: LassoError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LassoError::Index { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LassoError::Validation(_) | LassoError::Parse(_) | LassoError::Csv(_) => {
                StatusCode::BAD_REQUEST
            }
            LassoError::Config(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn join_error(e: &tokio::task::JoinError) -> ApiError {
    ApiError(LassoError::Server(format!("background task failed: {e}")))
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct PointView {
    index: usize,
    name: String,
    x: f64,
    y: f64,
    label: String,
    category: String,
    size: f64,
}

#[derive(Debug, Serialize)]
struct SessionView {
    title: String,
    statistics: LabelStatistics,
    colour: ColourStrategy,
    selection: Vec<usize>,
    points: Vec<PointView>,
    notifications: Vec<Notification>,
}

#[derive(Deserialize)]
struct SelectRequest {
    boundary: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
struct SelectResponse {
    indices: Vec<usize>,
}

#[derive(Deserialize)]
struct LabelRequest {
    #[serde(default)]
    indices: Option<Vec<usize>>,
    label: String,
}

#[derive(Debug, Serialize)]
struct LabelResponse {
    title: String,
    statistics: LabelStatistics,
    notifications: Vec<Notification>,
}

#[derive(Deserialize)]
struct HighlightRequest {
    features: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HighlightResponse {
    highlighted: usize,
}

#[derive(Deserialize, Default)]
struct RankRequest {
    #[serde(default)]
    indices: Option<Vec<usize>>,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RankResponse {
    selected_rows: usize,
    summary: String,
    features: Vec<FeatureScore>,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    saved: bool,
    path: String,
    notifications: Vec<Notification>,
}

fn session_view(session: &mut Session) -> SessionView {
    let table = session.table();
    let statistics = table.statistics();
    let points = table
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| PointView {
            index,
            name: row.name.clone(),
            x: row.x,
            y: row.y,
            label: row.label.clone(),
            category: row.category.clone(),
            size: row.size,
        })
        .collect();

    SessionView {
        title: statistics.title(),
        colour: table.colour_strategy().clone(),
        selection: session.selection().to_vec(),
        statistics,
        points,
        notifications: session.drain_notifications(),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_session(State(state): State<SharedState>) -> Json<SessionView> {
    let mut session = state.session.lock().await;
    Json(session_view(&mut session))
}

async fn select(
    State(state): State<SharedState>,
    Json(req): Json<SelectRequest>,
) -> Json<SelectResponse> {
    let lasso = Lasso::new(req.boundary.iter().map(|&[x, y]| (x, y)).collect());
    let mut session = state.session.lock().await;
    let indices = session.select(&lasso).to_vec();
    log::debug!("Lasso selected {} points", indices.len());
    Json(SelectResponse { indices })
}

async fn label(
    State(state): State<SharedState>,
    Json(req): Json<LabelRequest>,
) -> ApiResult<LabelResponse> {
    let mut session = state.session.lock().await;
    session.label(req.indices.as_deref(), &req.label)?;
    let statistics = session.statistics();
    Ok(Json(LabelResponse {
        title: statistics.title(),
        statistics,
        notifications: session.drain_notifications(),
    }))
}

async fn colour(
    State(state): State<SharedState>,
    Json(strategy): Json<ColourStrategy>,
) -> ApiResult<SessionView> {
    let mut session = state.session.lock().await;
    session.set_colour(strategy)?;
    Ok(Json(session_view(&mut session)))
}

async fn highlight(
    State(state): State<SharedState>,
    Json(req): Json<HighlightRequest>,
) -> ApiResult<HighlightResponse> {
    let mut session = state.session.lock().await;
    let highlighted = session.highlight(&req.features)?;
    Ok(Json(HighlightResponse { highlighted }))
}

async fn rank(
    State(state): State<SharedState>,
    Json(req): Json<RankRequest>,
) -> ApiResult<RankResponse> {
    let (snapshot, notifications) = {
        let mut session = state.session.lock().await;
        let snapshot = session.ranking_snapshot(req.indices.as_deref())?;
        (snapshot, session.drain_notifications())
    };
    let k = req.k.unwrap_or(DEFAULT_TOP_K);
    let selected_rows = snapshot.selected_rows();

    let features = tokio::task::spawn_blocking(move || snapshot.run(k))
        .await
        .map_err(|e| join_error(&e))??;

    let names: Vec<&str> = features.iter().map(|f| f.name.as_str()).collect();
    Ok(Json(RankResponse {
        selected_rows,
        summary: format!("Important features: {}", names.join(", ")),
        features,
        notifications,
    }))
}

async fn save(State(state): State<SharedState>) -> ApiResult<SaveResponse> {
    let _saving = state.saving.lock().await;
    let job = state.session.lock().await.save_job();
    let path = job.path().to_path_buf();

    let outcome = tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|e| join_error(&e))?;

    let mut session = state.session.lock().await;
    session.report_save(&path, &outcome);
    Ok(Json(SaveResponse {
        saved: outcome.is_ok(),
        path: path.display().to_string(),
        notifications: session.drain_notifications(),
    }))
}

// ── Server ────────────────────────────────────────────────────────────────

/// Build the router for one session
pub fn router(session: Session) -> Router {
    let state: SharedState = Arc::new(AppState::new(session));
    Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session))
        .route("/select", post(select))
        .route("/label", post(label))
        .route("/colour", post(colour))
        .route("/highlight", post(highlight))
        .route("/rank", post(rank))
        .route("/save", post(save))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    log::info!("Received shutdown signal");
}

/// Serve `session` until Ctrl+C or SIGTERM
///
/// # Errors
/// Returns `Server` if the address cannot be bound or the server fails
pub async fn serve(session: Session, config: &ServeConfig) -> Result<()> {
    let addr = format!("{}:{}", config.address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LassoError::Server(format!("failed to bind {addr}: {e}")))?;

    log::info!("Opening labelling session on http://{addr}/");

    axum::serve(listener, router(session))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LassoError::Server(e.to_string()))?;

    log::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{load_features, FeatureSource};
    use crate::structs::{CsvData, Table, TableOptions, ToastLevel};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn shared_session(output: PathBuf) -> SharedState {
        let content = "name,x,y,has-a,has-b\n\
                       p1,0.1,0.1,True,False\n\
                       p2,0.2,0.8,True,True\n\
                       p3,5.0,5.0,False,True\n\
                       p4,6.0,5.5,False,False\n";
        let csv = CsvData::from_reader(content.as_bytes(), false).expect("parse");
        let table = Table::from_csv(csv, &TableOptions::default()).expect("table");
        let features = load_features(&FeatureSource::Prefix("has-".into()), &table, false)
            .expect("features");
        Arc::new(AppState::new(Session::new(table, output, features, false)))
    }

    fn square() -> SelectRequest {
        SelectRequest {
            boundary: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        }
    }

    #[tokio::test]
    async fn test_select_label_rank() {
        let state = shared_session(PathBuf::from("unused.csv"));

        let Json(selected) = select(State(state.clone()), Json(square())).await;
        assert_eq!(selected.indices, vec![0, 1]);

        let Ok(Json(labelled)) = label(
            State(state.clone()),
            Json(LabelRequest {
                indices: None,
                label: "near".into(),
            }),
        )
        .await
        else {
            panic!("label failed");
        };
        assert_eq!(labelled.title, "Scatter plot lasso labeller, labeled: 50.0%");
        assert_eq!(labelled.notifications.len(), 1);

        let Ok(Json(ranked)) = rank(State(state.clone()), Json(RankRequest::default())).await
        else {
            panic!("rank failed");
        };
        assert_eq!(ranked.selected_rows, 2);
        assert_eq!(ranked.features[0].name, "has-a");
        assert!(ranked.summary.starts_with("Important features: has-a"));
    }

    #[tokio::test]
    async fn test_label_out_of_range() {
        let state = shared_session(PathBuf::from("unused.csv"));

        let result = label(
            State(state.clone()),
            Json(LabelRequest {
                indices: Some(vec![0, 9]),
                label: "bad".into(),
            }),
        )
        .await;

        let Err(err) = result else {
            panic!("expected error");
        };
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.session.lock().await.table().labels().iter().all(|l| l.is_empty()));
    }

    #[tokio::test]
    async fn test_colour_unknown_column() {
        let state = shared_session(PathBuf::from("unused.csv"));
        let result = colour(
            State(state),
            Json(ColourStrategy::Column {
                column: "missing".into(),
            }),
        )
        .await;
        let Err(err) = result else {
            panic!("expected error");
        };
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_session_view() {
        let state = shared_session(PathBuf::from("unused.csv"));
        let Json(view) = get_session(State(state)).await;

        assert_eq!(view.points.len(), 4);
        assert_eq!(view.title, "Scatter plot lasso labeller, labeled: 0.0%");
        assert_eq!(view.points[0].category, "unlabelled");
        assert_eq!(view.colour, ColourStrategy::Label);
    }

    #[tokio::test]
    async fn test_highlight() {
        let state = shared_session(PathBuf::from("unused.csv"));
        let Ok(Json(resp)) = highlight(
            State(state.clone()),
            Json(HighlightRequest {
                features: vec!["has-b".into()],
            }),
        )
        .await
        else {
            panic!("highlight failed");
        };
        assert_eq!(resp.highlighted, 2);
        assert_eq!(
            state.session.lock().await.table().colour_strategy(),
            &ColourStrategy::Highlight
        );
    }

    #[tokio::test]
    async fn test_save_writes_file() {
        let dir = tempdir().expect("dir");
        let path = dir.path().join("points_labelled.csv");
        let state = shared_session(path.clone());

        let Ok(Json(resp)) = save(State(state)).await else {
            panic!("save failed");
        };
        assert!(resp.saved);
        assert!(path.exists());
        assert!(matches!(
            resp.notifications[..],
            [Notification::Toast {
                level: ToastLevel::Success,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_save_failure_is_not_fatal() {
        let dir = tempdir().expect("dir");
        let path = dir.path().join("missing").join("out.csv");
        let state = shared_session(path);

        let Ok(Json(resp)) = save(State(state.clone())).await else {
            panic!("save handler failed");
        };
        assert!(!resp.saved);
        assert!(matches!(
            resp.notifications[..],
            [Notification::Toast {
                level: ToastLevel::Error,
                ..
            }]
        ));

        let Json(view) = get_session(State(state)).await;
        assert_eq!(view.points.len(), 4);
    }

    #[tokio::test]
    async fn test_save_waits_for_earlier_save() {
        let dir = tempdir().expect("dir");
        let path = dir.path().join("points_labelled.csv");
        let state = shared_session(path.clone());

        let in_flight = state.saving.lock().await;
        let pending = tokio::spawn(save(State(state.clone())));
        tokio::task::yield_now().await;

        let labelled = label(
            State(state.clone()),
            Json(LabelRequest {
                indices: Some(vec![3]),
                label: "late".into(),
            }),
        )
        .await;
        assert!(labelled.is_ok());
        drop(in_flight);

        let Ok(Json(resp)) = pending.await.expect("join") else {
            panic!("save failed");
        };
        assert!(resp.saved);
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("p4,6.0,5.5,False,False,late\n"));
    }

    #[tokio::test]
    async fn test_rank_empty_selection_warns() {
        let state = shared_session(PathBuf::from("unused.csv"));

        let Ok(Json(ranked)) = rank(State(state), Json(RankRequest::default())).await else {
            panic!("rank failed");
        };
        assert_eq!(ranked.selected_rows, 0);
        assert!(ranked.features.iter().all(|f| f.mcc.is_none()));
        assert!(matches!(
            ranked.notifications[..],
            [Notification::Toast {
                level: ToastLevel::Warning,
                ..
            }]
        ));
    }
}
