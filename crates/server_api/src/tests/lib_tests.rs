use super::*;
use serde_json::json;

async fn setup() -> (ApiContext, tempfile::TempDir) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let dir = tempfile::tempdir().expect("tempdir");
    (
        ApiContext {
            storage,
            objects: FsObjectStore::new(dir.path()),
            max_page_size: 500,
        },
        dir,
    )
}

#[test]
fn page_token_round_trips_and_rejects_garbage() {
    let token = encode_page_token(EntityId(42));
    assert_eq!(decode_page_token(&token).expect("decode"), EntityId(42));
    let err = decode_page_token("%%%").expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn unknown_collection_is_reported() {
    let (ctx, _dir) = setup().await;
    let err = list_records(&ctx, "benches", &ListOptions::default())
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::UnknownCollection);
}

#[tokio::test]
async fn list_follows_next_token_to_exhaustion() {
    let (ctx, _dir) = setup().await;
    for id in 1..=3 {
        create_record(&ctx, "machines", json!({ "id": id, "name": format!("m{id}") }))
            .await
            .expect("create");
    }

    let mut options = ListOptions {
        limit: Some(2),
        next_token: None,
    };
    let mut seen = Vec::new();
    loop {
        let page = list_records(&ctx, "machines", &options).await.expect("page");
        seen.extend(page.data.iter().filter_map(record_id));
        match page.next_token {
            Some(token) => options.next_token = Some(token),
            None => break,
        }
    }
    assert_eq!(seen, vec![EntityId(1), EntityId(2), EntityId(3)]);
}

#[tokio::test]
async fn create_rejects_records_missing_required_fields() {
    let (ctx, _dir) = setup().await;
    let err = create_record(&ctx, "workouts", json!({ "description": "no name" }))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn create_assigns_id_when_absent() {
    let (ctx, _dir) = setup().await;
    let change = create_record(&ctx, "workouts", json!({ "name": "Legs" }))
        .await
        .expect("create");
    assert_eq!(change.op, ChangeOp::Create);
    assert_eq!(record_id(&change.record), Some(EntityId(1)));
}

#[tokio::test]
async fn relationship_must_link_two_entities() {
    let (ctx, _dir) = setup().await;
    let err = create_record(&ctx, "relationships", json!({ "id": 1, "machineId": 3 }))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(err.message.ends_with("found [machineId]"), "{}", err.message);

    let err = create_record(
        &ctx,
        "relationships",
        json!({ "id": 1, "machineId": 3, "muscleId": 4, "exerciseId": 5 }),
    )
    .await
    .expect_err("three links");
    assert!(
        err.message.ends_with("found [muscleId, exerciseId, machineId]"),
        "{}",
        err.message
    );

    let change = create_record(
        &ctx,
        "relationships",
        json!({ "id": 1, "machineId": 3, "muscleId": 4 }),
    )
    .await
    .expect("create");
    assert_eq!(change.collection, EntityKind::Relationships);
}

#[tokio::test]
async fn update_rejects_mismatched_ids_and_missing_records() {
    let (ctx, _dir) = setup().await;
    let err = update_record(&ctx, "muscles", 2, json!({ "id": 3, "name": "Quads" }))
        .await
        .expect_err("mismatch");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = update_record(&ctx, "muscles", 2, json!({ "name": "Quads" }))
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn delete_returns_removed_record() {
    let (ctx, _dir) = setup().await;
    create_record(&ctx, "locations", json!({ "id": 9, "name": "Main Gym" }))
        .await
        .expect("create");
    let change = delete_record(&ctx, "locations", 9).await.expect("delete");
    assert_eq!(change.op, ChangeOp::Delete);
    assert_eq!(change.record["name"], "Main Gym");

    let err = delete_record(&ctx, "locations", 9)
        .await
        .expect_err("gone");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn objects_validate_paths_and_bodies() {
    let (ctx, _dir) = setup().await;
    let err = put_object(&ctx, "../escape.jpg", b"x")
        .await
        .expect_err("bad path");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = put_object(&ctx, "images/machine/machine-1.jpg", b"")
        .await
        .expect_err("empty body");
    assert_eq!(err.code, ErrorCode::Validation);

    put_object(&ctx, "images/machine/machine-1.jpg", b"jpeg")
        .await
        .expect("put");
    let bytes = get_object(&ctx, "images/machine/machine-1.jpg")
        .await
        .expect("get");
    assert_eq!(bytes, b"jpeg");

    let err = get_object(&ctx, "images/machine/machine-2.jpg")
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}
