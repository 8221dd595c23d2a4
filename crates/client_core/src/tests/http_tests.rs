use super::*;
use crate::{data_client::fetch_all_records, entity_store::EntityStore};
use axum::{
    extract::{Path, Query},
    http::StatusCode as AxumStatus,
    routing::{get, put},
    Json, Router,
};
use serde_json::json;
use shared::{domain::Machine, error::ErrorCode};
use tokio::net::TcpListener;

async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

async fn paged_machines(Query(options): Query<ListOptions>) -> Json<ListPage> {
    let page = match options.next_token.as_deref() {
        None => ListPage {
            data: vec![json!({ "id": 1, "name": "Bench" }), json!({ "id": 2, "name": "Rower" })],
            next_token: Some("page-2".to_string()),
        },
        Some("page-2") => ListPage {
            data: vec![json!({ "id": 3, "name": "Sled" })],
            next_token: None,
        },
        Some(_) => ListPage::default(),
    };
    Json(page)
}

#[test]
fn websocket_url_switches_scheme_and_appends_path() {
    assert_eq!(
        websocket_url("http://127.0.0.1:8080").expect("url").as_str(),
        "ws://127.0.0.1:8080/ws"
    );
    assert_eq!(
        websocket_url("https://gym.example/api/").expect("url").as_str(),
        "wss://gym.example/api/ws"
    );
    assert!(websocket_url("ftp://gym.example").is_err());
}

#[tokio::test]
async fn fetch_all_follows_next_token_over_http() {
    let router = Router::new().route("/collections/machines", get(paged_machines));
    let client = HttpDataClient::new(spawn_server(router).await);

    let records = fetch_all_records(&client, EntityKind::Machines)
        .await
        .expect("records");
    assert_eq!(records.len(), 3);

    let store = EntityStore::<Machine>::fetch_all(&client)
        .await
        .expect("store");
    assert_eq!(store.next_id(), EntityId(4));
}

#[tokio::test]
async fn create_parses_error_payload_on_bad_request() {
    let router = Router::new().route(
        "/collections/relationships",
        axum::routing::post(|| async {
            (
                AxumStatus::BAD_REQUEST,
                Json(MutationResponse::failed(ApiError::new(
                    ErrorCode::Validation,
                    "relationship must link exactly two entities",
                ))),
            )
        }),
    );
    let client = HttpDataClient::new(spawn_server(router).await);

    let response = client
        .create(EntityKind::Relationships, json!({ "id": 1 }))
        .await
        .expect("response");
    assert!(response.data.is_none());
    assert_eq!(response.errors[0].code, ErrorCode::Validation);
}

#[tokio::test]
async fn delete_surfaces_api_error_body() {
    let router = Router::new().route(
        "/collections/muscles/:id",
        axum::routing::delete(|Path(id): Path<i64>| async move {
            (
                AxumStatus::NOT_FOUND,
                Json(ApiError::not_found("muscles", id)),
            )
        }),
    );
    let client = HttpDataClient::new(spawn_server(router).await);

    let err = client
        .delete(EntityKind::Muscles, EntityId(5))
        .await
        .expect_err("should fail");
    let api = err
        .downcast_ref::<ApiException>()
        .expect("api exception in chain");
    assert_eq!(api.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn object_get_maps_not_found_to_none() {
    let router = Router::new().route(
        "/storage/*path",
        get(|Path(path): Path<String>| async move {
            if path == "images/machine/machine-1.jpg" {
                Ok(b"jpeg".to_vec())
            } else {
                Err(AxumStatus::NOT_FOUND)
            }
        })
        .merge(put(|| async { AxumStatus::NO_CONTENT })),
    );
    let client = HttpDataClient::new(spawn_server(router).await);

    let found = client
        .get_object("images/machine/machine-1.jpg")
        .await
        .expect("get");
    assert_eq!(found.as_deref(), Some(&b"jpeg"[..]));
    let missing = client
        .get_object("images/machine/machine-2.jpg")
        .await
        .expect("get");
    assert!(missing.is_none());
    client
        .put_object("images/machine/machine-2.jpg", b"new".to_vec())
        .await
        .expect("put");
}
