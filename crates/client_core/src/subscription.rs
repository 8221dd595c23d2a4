//! Bridges the data API change feed into navigation events.

use shared::{
    domain::{record_id, EntityKind},
    protocol::{ActionType, AppEvent, ChangeNotification, ChangeOp, PageType},
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// The event a page raises when a change arrives for the collection it shows.
pub fn app_event_for_change(change: &ChangeNotification, page: PageType) -> AppEvent {
    let action = match change.op {
        ChangeOp::Create => ActionType::Create,
        ChangeOp::Update => ActionType::Update,
        ChangeOp::Delete => ActionType::Delete,
    };
    AppEvent {
        entity: change.collection.collection_name().to_string(),
        action_type: Some(action),
        page_type: page,
        entity_id: record_id(&change.record),
        entity_data: change.record.as_object().cloned(),
    }
}

/// Publishes an [`AppEvent`] for every change (optionally only those of one
/// collection) until the feed closes or nobody listens for events anymore.
/// Returns how many events were published.
pub async fn forward_changes(
    mut changes: broadcast::Receiver<ChangeNotification>,
    only: Option<EntityKind>,
    page: PageType,
    events: watch::Sender<Option<AppEvent>>,
) -> usize {
    let mut forwarded = 0;
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscription: change feed lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if only.is_some_and(|kind| kind != change.collection) {
            continue;
        }

        let event = app_event_for_change(&change, page.clone());
        debug!(collection = %change.collection, op = ?change.op, "subscription: change forwarded");
        if events.send(Some(event)).is_err() {
            break;
        }
        forwarded += 1;
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_client::DataClient, memory::InMemoryDataClient};
    use serde_json::json;
    use shared::domain::EntityId;

    #[test]
    fn change_maps_to_crud_action_on_its_collection() {
        let change = ChangeNotification {
            collection: EntityKind::WorkoutExercises,
            op: ChangeOp::Delete,
            record: json!({ "id": 9, "workoutId": 3 }),
        };
        let event = app_event_for_change(&change, PageType::List);

        assert_eq!(event.entity, "workoutExercises");
        assert_eq!(event.action_type, Some(ActionType::Delete));
        assert_eq!(event.page_type, PageType::List);
        assert_eq!(event.entity_id, Some(EntityId(9)));
        assert_eq!(event.entity_data.expect("data")["workoutId"], 3);
    }

    #[tokio::test]
    async fn forwards_only_filtered_collection_until_feed_closes() {
        let client = InMemoryDataClient::new();
        let (events_tx, mut events_rx) = watch::channel(None);
        let task = tokio::spawn(forward_changes(
            client.subscribe(),
            Some(EntityKind::Machines),
            PageType::List,
            events_tx,
        ));

        client
            .create(EntityKind::Muscles, json!({ "name": "Chest" }))
            .await
            .expect("create muscle");
        client
            .create(EntityKind::Machines, json!({ "name": "Bench" }))
            .await
            .expect("create machine");

        events_rx.changed().await.expect("event");
        let event = events_rx.borrow_and_update().clone().expect("some event");
        assert_eq!(event.entity, "machines");
        assert_eq!(event.action_type, Some(ActionType::Create));

        drop(client);
        assert_eq!(task.await.expect("forwarder"), 1);
    }
}
