use super::*;
use crate::memory::{CallKind, InMemoryDataClient};
use serde_json::json;
use std::time::Duration;

fn navigator() -> (Navigator, Arc<InMemoryDataClient>) {
    let client = Arc::new(InMemoryDataClient::new());
    (Navigator::new(client.clone()), client)
}

async fn seed_builder_data(client: &InMemoryDataClient) {
    client
        .seed(
            EntityKind::Exercises,
            [
                json!({ "id": 1, "name": "Squat" }),
                json!({ "id": 2, "name": "Deadlift" }),
            ],
        )
        .await;
    client
        .seed(
            EntityKind::WorkoutExercises,
            [json!({ "id": 10, "workoutId": 3, "exerciseId": 1, "name": "Squat", "position": 1 })],
        )
        .await;
}

#[tokio::test]
async fn missing_action_type_always_routes_home() {
    let (mut nav, client) = navigator();
    for page in ["APPHOME", "LIST", "EDIT", "BUILDER", "COMBO_SEARCH", "GALLERY"] {
        let event = AppEvent {
            entity: "machines".into(),
            action_type: None,
            page_type: PageType::from(page),
            entity_id: Some(EntityId(4)),
            entity_data: None,
        };
        assert_eq!(nav.dispatch(&event).await, Route::home(), "page {page}");
    }
    assert!(nav.selections().is_empty());
    assert!(client.calls().await.is_empty());
}

#[tokio::test]
async fn list_edit_request_remembers_selection_and_routes_to_detail() {
    let (mut nav, _client) = navigator();
    let event = AppEvent::new("LIST", "EDIT_REQUEST", "machines").with_entity_id(12);

    let route = nav.dispatch(&event).await;

    assert_eq!(route.as_str(), "/machines/12");
    assert_eq!(nav.selections().get("machines"), Some("12"));
}

#[tokio::test]
async fn apphome_find_request_routes_to_find_page() {
    let (mut nav, _client) = navigator();
    let route = nav
        .dispatch(&AppEvent::new("APPHOME", "FIND_REQUEST", ""))
        .await;
    assert_eq!(route.as_str(), "/app/find");
}

#[tokio::test]
async fn combo_search_selection_route() {
    let (mut nav, _client) = navigator();
    let route = nav
        .dispatch(&AppEvent::new("COMBO_SEARCH", "SELECT", "machines").with_entity_id(7))
        .await;
    assert_eq!(route.as_str(), "/app/find/machines-selection/machines/7");

    let cancelled = nav
        .dispatch(&AppEvent::new("COMBO_SEARCH", "CANCEL_REQUEST", "machines"))
        .await;
    assert_eq!(cancelled.as_str(), "/app/find");
}

#[tokio::test]
async fn builder_cancel_returns_to_workout_without_remote_calls() {
    let (mut nav, client) = navigator();
    nav.selections_mut().remember("workouts", 3);

    let route = nav
        .dispatch(&AppEvent::new("BUILDER", "CANCEL_REQUEST", "exercises").with_entity_id(2))
        .await;

    assert_eq!(route.as_str(), "/workouts/3");
    assert!(client.calls().await.is_empty());
}

#[tokio::test]
async fn builder_add_saves_join_row_then_returns_to_workout() {
    let (mut nav, client) = navigator();
    seed_builder_data(&client).await;
    nav.dispatch(&AppEvent::new("EDIT", "BUILD_REQUEST", "workouts").with_entity_id(3))
        .await;

    let route = nav
        .dispatch(&AppEvent::new("BUILDER", "ADD", "exercises").with_entity_id(2))
        .await;

    assert_eq!(route.as_str(), "/workouts/3");
    let saved = client.records(EntityKind::WorkoutExercises).await;
    assert_eq!(saved.len(), 2);
    let added = &saved[1];
    assert_eq!(added["id"], 11);
    assert_eq!(added["workoutId"], 3);
    assert_eq!(added["exerciseId"], 2);
    assert_eq!(added["name"], "Deadlift");
    assert_eq!(added["position"], 2);
}

#[tokio::test]
async fn builder_add_still_navigates_when_create_fails() {
    let (mut nav, client) = navigator();
    seed_builder_data(&client).await;
    client
        .set_failing(CallKind::Create, EntityKind::WorkoutExercises, true)
        .await;
    nav.selections_mut().remember("workouts", 3);

    let route = nav
        .dispatch(&AppEvent::new("BUILDER", "ADD", "exercises").with_entity_id(1))
        .await;

    assert_eq!(route.as_str(), "/workouts/3");
    assert_eq!(client.records(EntityKind::WorkoutExercises).await.len(), 1);
}

#[tokio::test]
async fn builder_add_without_workout_selection_goes_home() {
    let (mut nav, client) = navigator();
    seed_builder_data(&client).await;
    let route = nav
        .dispatch(&AppEvent::new("BUILDER", "ADD", "exercises").with_entity_id(1))
        .await;
    assert!(route.is_home());
    assert!(client.mutations().await.is_empty());
}

#[tokio::test]
async fn unknown_combination_routes_home() {
    let (mut nav, _client) = navigator();
    let route = nav
        .dispatch(&AppEvent::new("NEW", "FIND_REQUEST", "machines"))
        .await;
    assert!(route.is_home());
}

#[tokio::test]
async fn detail_route_without_entity_id_routes_home() {
    let (mut nav, _client) = navigator();
    let route = nav
        .dispatch(&AppEvent::new("LIST", "EDIT_REQUEST", "machines"))
        .await;
    assert!(route.is_home());
    assert!(nav.selections().is_empty());
}

#[tokio::test]
async fn default_bucket_maps_common_actions_to_entity_routes() {
    let (mut nav, _client) = navigator();
    let cases = [
        ("EDIT_REQUEST", "/locations/5"),
        ("NEW_REQUEST", "/locations/new"),
        ("LIST_REQUEST", "/locations"),
        ("CANCEL_REQUEST", "/locations"),
        ("UPDATE", "/locations"),
        ("DELETE", "/locations"),
        ("CREATE", "/locations"),
    ];
    for (action, expected) in cases {
        let event = AppEvent::new("DETAIL_PANEL", action, "locations").with_entity_id(5);
        assert_eq!(nav.dispatch(&event).await.as_str(), expected, "action {action}");
    }
    assert_eq!(nav.selections().get("locations"), Some("5"));
}

#[test]
fn table_is_inspectable_without_dispatching() {
    assert_eq!(
        transition(&PageType::Builder, &ActionType::Add),
        NavigationAction::RouteWithSideEffect(SideEffect::AddToCurrentWorkout)
    );
    assert_eq!(
        transition(&PageType::New, &ActionType::Create),
        NavigationAction::RouteTo(RouteTemplate::EntityList)
    );
    assert_eq!(
        transition(&PageType::Control, &ActionType::Other("SHUFFLE".into())),
        NavigationAction::Unknown
    );
}

#[tokio::test]
async fn every_table_row_renders_its_route() {
    let rows = [
        ("APPHOME", "FIND_REQUEST", "/app/find"),
        ("APPHOME", "BUILD_REQUEST", "/app/builder"),
        ("APPHOME", "CONTROL_REQUEST", "/app/control"),
        ("APPHOME", "LIST_REQUEST", "/machines"),
        ("APPHOME", "HOME_REQUEST", "/"),
        ("CONTROL", "LIST_REQUEST", "/machines"),
        ("CONTROL", "NEW_REQUEST", "/machines/new"),
        ("CONTROL", "CANCEL_REQUEST", "/"),
        ("COMBO_SEARCH", "SELECT", "/app/find/machines-selection/machines/5"),
        ("COMBO_SEARCH", "CANCEL_REQUEST", "/app/find"),
        ("LIST", "EDIT_REQUEST", "/machines/5"),
        ("LIST", "NEW_REQUEST", "/machines/new"),
        ("LIST", "CANCEL_REQUEST", "/"),
        ("LIST", "DELETE", "/machines"),
        ("NEW", "CREATE", "/machines"),
        ("NEW", "CANCEL_REQUEST", "/machines"),
        ("EDIT", "UPDATE", "/machines"),
        ("EDIT", "DELETE", "/machines"),
        ("EDIT", "CANCEL_REQUEST", "/machines"),
        ("EDIT", "EDIT_REQUEST", "/machines/5"),
        ("EDIT", "BUILD_REQUEST", "/app/builder"),
        ("BUILDER", "CANCEL_REQUEST", "/workouts/3"),
    ];

    for (page, action, expected) in rows {
        let (mut nav, client) = navigator();
        nav.selections_mut().remember("workouts", 3);
        let event = AppEvent::new(page, action, "machines").with_entity_id(5);

        let route = nav.dispatch(&event).await;

        assert_eq!(route.as_str(), expected, "{page}/{action}");
        assert!(client.calls().await.is_empty(), "{page}/{action} made remote calls");
    }
}

#[tokio::test]
async fn edit_page_edit_request_remembers_selection() {
    let (mut nav, _client) = navigator();
    let route = nav
        .dispatch(&AppEvent::new("EDIT", "EDIT_REQUEST", "machines").with_entity_id(5))
        .await;

    assert_eq!(route.as_str(), "/machines/5");
    assert_eq!(nav.selections().get("machines"), Some("5"));
}

#[tokio::test]
async fn dispatch_loop_routes_latest_event() {
    let (nav, _client) = navigator();
    let (event_tx, event_rx) = watch::channel(None);
    let (route_tx, mut route_rx) = watch::channel(Route::home());
    let handle = tokio::spawn(run_dispatch_loop(nav, event_rx, route_tx));

    event_tx
        .send(Some(
            AppEvent::new("LIST", "EDIT_REQUEST", "muscles").with_entity_id(8),
        ))
        .expect("send event");
    tokio::time::timeout(Duration::from_secs(2), route_rx.changed())
        .await
        .expect("route in time")
        .expect("route channel open");
    assert_eq!(route_rx.borrow().as_str(), "/muscles/8");

    drop(event_tx);
    let nav = handle.await.expect("loop finished");
    assert_eq!(nav.selections().get("muscles"), Some("8"));
}
