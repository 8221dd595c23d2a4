//! Client-side core of the gym tracker: the data API capability, keyed entity
//! stores, the navigation dispatcher and the relationship editor.

pub mod data_client;
pub mod entity_store;
pub mod http;
pub mod images;
pub mod memory;
pub mod navigation;
pub mod relationship_editor;
pub mod subscription;

pub use data_client::{create_entity, fetch_all_records, DataClient, DataClientError};
pub use entity_store::EntityStore;
pub use http::HttpDataClient;
pub use images::{image_path, load_image, ObjectStore};
pub use memory::{CallKind, InMemoryDataClient, RemoteCall};
pub use navigation::{
    run_dispatch_loop, transition, EntitySelections, NavigationAction, Navigator, Route,
    RouteTemplate, SideEffect, HOME_ROUTE,
};
pub use relationship_editor::{
    EditOutcome, EditorError, PartnerSummary, RelationshipEditor, RelationshipForm,
    RelationshipHandle, RemoteOp, RollbackReport, UndoEntry,
};
pub use subscription::{app_event_for_change, forward_changes};
