use std::{sync::Arc, time::Duration};

use client_core::{
    forward_changes, run_dispatch_loop, DataClient, EditOutcome, InMemoryDataClient, Navigator,
    RelationshipEditor, RelationshipForm, Route,
};
use serde_json::json;
use shared::{
    domain::{EntityId, EntityKind},
    protocol::{AppEvent, PageType},
};
use tokio::sync::watch;

async fn gym() -> Arc<InMemoryDataClient> {
    let client = Arc::new(InMemoryDataClient::with_page_size(2));
    client
        .seed(
            EntityKind::Machines,
            [
                json!({ "id": 1, "name": "Cable Tower", "displayNum": 1 }),
                json!({ "id": 2, "name": "Smith Machine", "displayNum": 2 }),
            ],
        )
        .await;
    client
        .seed(
            EntityKind::Muscles,
            (1..=5).map(|id| json!({ "id": id, "name": format!("Muscle {id}") })),
        )
        .await;
    client
        .seed(
            EntityKind::Exercises,
            [
                json!({ "id": 1, "name": "Face Pull" }),
                json!({ "id": 2, "name": "Cable Fly" }),
            ],
        )
        .await;
    client
        .seed(EntityKind::Workouts, [json!({ "id": 1, "name": "Upper" })])
        .await;
    client
        .seed(
            EntityKind::Relationships,
            (1..=3).map(|id| json!({ "id": id, "machineId": 2, "muscleId": id })),
        )
        .await;
    client
}

async fn next_route(routes: &mut watch::Receiver<Route>) -> Route {
    tokio::time::timeout(Duration::from_secs(2), routes.changed())
        .await
        .expect("route in time")
        .expect("route channel open");
    routes.borrow_and_update().clone()
}

#[tokio::test]
async fn edit_machine_relationships_then_return_to_list() {
    let client = gym().await;
    let mut nav = Navigator::new(client.clone());

    let detail = nav
        .dispatch(&AppEvent::new("LIST", "EDIT_REQUEST", "machines").with_entity_id(1))
        .await;
    assert_eq!(detail, Route::new("/machines/1"));

    let machine_id = nav
        .selections()
        .get_id("machines")
        .expect("machine selected");
    let mut muscles = RelationshipEditor::new(
        client.clone(),
        EntityKind::Machines,
        EntityKind::Muscles,
        machine_id,
    )
    .expect("editor");
    assert_eq!(muscles.load().await, EditOutcome::Applied);
    assert!(muscles.mapped().is_empty());
    assert_eq!(muscles.candidates().len(), 5);

    assert_eq!(muscles.add_partner(EntityId(4)).await, EditOutcome::Applied);
    assert_eq!(muscles.add_partner(EntityId(5)).await, EditOutcome::Applied);

    let mut form = RelationshipForm::new();
    form.push(muscles);
    assert_eq!(form.save_all(), 2);
    drop(form);

    let back = nav
        .dispatch(&AppEvent::new("EDIT", "UPDATE", "machines").with_entity_id(1))
        .await;
    assert_eq!(back, Route::new("/machines"));

    // Pages of two: the new rows were allocated past every existing id.
    let relationships = client.records(EntityKind::Relationships).await;
    assert_eq!(relationships.len(), 5);
    assert_eq!(relationships[3]["id"], 4);
    assert_eq!(relationships[4]["muscleId"], 5);
}

#[tokio::test]
async fn build_workout_through_dispatch_loop() {
    let client = gym().await;
    let (event_tx, event_rx) = watch::channel(None);
    let (route_tx, mut route_rx) = watch::channel(Route::home());
    let nav = tokio::spawn(run_dispatch_loop(
        Navigator::new(client.clone()),
        event_rx,
        route_tx,
    ));

    let steps = [
        (AppEvent::new("APPHOME", "BUILD_REQUEST", "workouts"), "/app/builder"),
        (
            AppEvent::new("EDIT", "BUILD_REQUEST", "workouts").with_entity_id(1),
            "/app/builder",
        ),
        (
            AppEvent::new("BUILDER", "ADD", "exercises").with_entity_id(2),
            "/workouts/1",
        ),
    ];
    for (event, expected) in steps {
        event_tx.send(Some(event)).expect("dispatch loop alive");
        assert_eq!(next_route(&mut route_rx).await.as_str(), expected);
    }

    drop(event_tx);
    let nav = nav.await.expect("dispatch loop");
    assert_eq!(nav.selections().get("workouts"), Some("1"));

    let joins = client.records(EntityKind::WorkoutExercises).await;
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0]["name"], "Cable Fly");
    assert_eq!(joins[0]["position"], 1);
}

#[tokio::test]
async fn relationship_changes_reach_the_navigator() {
    let client = gym().await;
    let (event_tx, event_rx) = watch::channel(None);
    let (route_tx, mut route_rx) = watch::channel(Route::home());
    let forwarder = tokio::spawn(forward_changes(
        client.subscribe(),
        Some(EntityKind::Relationships),
        PageType::New,
        event_tx,
    ));
    tokio::spawn(run_dispatch_loop(
        Navigator::new(client.clone()),
        event_rx,
        route_tx,
    ));

    let mut editor = RelationshipEditor::new(
        client.clone(),
        EntityKind::Exercises,
        EntityKind::Machines,
        EntityId(1),
    )
    .expect("editor");
    editor.load().await;
    assert_eq!(editor.add_partner(EntityId(1)).await, EditOutcome::Applied);

    assert_eq!(next_route(&mut route_rx).await.as_str(), "/relationships");

    assert_eq!(editor.save_relationships(), 1);
    forwarder.abort();
}
