use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde_json::Value;
use server_api::{
    create_record, delete_record, get_object, list_records, put_object, update_record, ApiContext,
};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ChangeNotification, ListOptions, ListPage, MutationResponse},
};
use storage::{FsObjectStore, Storage};
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    changes: broadcast::Sender<ChangeNotification>,
}

/// Upper bound for a single uploaded image.
const MAX_OBJECT_BYTES: usize = 8 * 1024 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        objects: FsObjectStore::new(&settings.storage_root),
        max_page_size: settings.max_page_size,
    };
    let (changes, _) = broadcast::channel(256);

    let app = build_router(Arc::new(AppState { api, changes }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, storage_root = %settings.storage_root.display(), "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let objects = Router::new()
        .route("/storage/*path", get(http_get_object).put(http_put_object))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_OBJECT_BYTES));

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/collections/:collection",
            get(http_list_records).post(http_create_record),
        )
        .route(
            "/collections/:collection/:id",
            put(http_update_record).delete(http_delete_record),
        )
        .route("/ws", get(ws_handler))
        .merge(objects)
        .with_state(state)
}

fn status_for(error: &ApiError) -> StatusCode {
    match error.code {
        ErrorCode::NotFound | ErrorCode::UnknownCollection => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    if error.code == ErrorCode::Internal {
        error!(message = %error.message, "api: internal error");
    }
    (status_for(&error), Json(error))
}

fn publish(state: &AppState, change: ChangeNotification) {
    // no subscribers is not an error
    let _ = state.changes.send(change);
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn http_list_records(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(options): Query<ListOptions>,
) -> ApiResult<Json<ListPage>> {
    let page = list_records(&state.api, &collection, &options)
        .await
        .map_err(reject)?;
    Ok(Json(page))
}

async fn http_create_record(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(record): Json<Value>,
) -> (StatusCode, Json<MutationResponse>) {
    match create_record(&state.api, &collection, record).await {
        Ok(change) => {
            let response = MutationResponse::ok(change.record.clone());
            publish(&state, change);
            (StatusCode::OK, Json(response))
        }
        Err(error) => {
            warn!(%collection, message = %error.message, "api: create rejected");
            (status_for(&error), Json(MutationResponse::failed(error)))
        }
    }
}

async fn http_update_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, i64)>,
    Json(record): Json<Value>,
) -> ApiResult<Json<Value>> {
    let change = update_record(&state.api, &collection, id, record)
        .await
        .map_err(reject)?;
    let record = change.record.clone();
    publish(&state, change);
    Ok(Json(record))
}

async fn http_delete_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    let change = delete_record(&state.api, &collection, id)
        .await
        .map_err(reject)?;
    publish(&state, change);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_get_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = get_object(&state.api, &path).await.map_err(reject)?;
    let content_type = if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

async fn http_put_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    put_object(&state.api, &path, &body)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut changes_rx = state.changes.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let change = match changes_rx.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws: subscriber lagged; dropping notifications");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&change) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
