use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use shared::{
    domain::{
        from_record, record_id, Entity, EntityId, EntityKind, Exercise, Location, Machine, Muscle,
        Relationship, RelationshipField, Setting, Workout, WorkoutExercise,
    },
    error::{ApiError, ErrorCode},
    protocol::{ChangeNotification, ChangeOp, ListOptions, ListPage},
};
use storage::{normalize_object_path, FsObjectStore, Storage};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub objects: FsObjectStore,
    pub max_page_size: u32,
}

pub fn parse_collection(collection: &str) -> Result<EntityKind, ApiError> {
    collection
        .parse::<EntityKind>()
        .map_err(|e| ApiError::new(ErrorCode::UnknownCollection, e.to_string()))
}

pub fn encode_page_token(last_id: EntityId) -> String {
    URL_SAFE_NO_PAD.encode(last_id.0.to_string())
}

pub fn decode_page_token(token: &str) -> Result<EntityId, ApiError> {
    let invalid = || ApiError::new(ErrorCode::Validation, "invalid nextToken");
    let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let text = String::from_utf8(raw).map_err(|_| invalid())?;
    text.parse::<i64>().map(EntityId).map_err(|_| invalid())
}

pub async fn list_records(
    ctx: &ApiContext,
    collection: &str,
    options: &ListOptions,
) -> Result<ListPage, ApiError> {
    let kind = parse_collection(collection)?;
    let limit = options
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, ctx.max_page_size.max(1));
    let after = options
        .next_token
        .as_deref()
        .map(decode_page_token)
        .transpose()?;

    let page = ctx
        .storage
        .list_records(kind, limit, after)
        .await
        .map_err(internal)?;
    Ok(ListPage {
        data: page.records,
        next_token: page.last_id.map(encode_page_token),
    })
}

pub async fn create_record(
    ctx: &ApiContext,
    collection: &str,
    record: Value,
) -> Result<ChangeNotification, ApiError> {
    let kind = parse_collection(collection)?;
    let mut probe = record.clone();
    if let Some(fields) = probe.as_object_mut() {
        fields.entry("id").or_insert(Value::from(0));
    }
    validate_shape(kind, &probe)?;

    let stored = ctx
        .storage
        .insert_record(kind, record)
        .await
        .map_err(internal)?;
    debug!(collection = kind.collection_name(), id = ?record_id(&stored), "api: record created");
    Ok(ChangeNotification {
        collection: kind,
        op: ChangeOp::Create,
        record: stored,
    })
}

pub async fn update_record(
    ctx: &ApiContext,
    collection: &str,
    id: i64,
    mut record: Value,
) -> Result<ChangeNotification, ApiError> {
    let kind = parse_collection(collection)?;
    if let Some(body_id) = record_id(&record) {
        if body_id.0 != id {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("record id {body_id} does not match path id {id}"),
            ));
        }
    }
    if let Some(fields) = record.as_object_mut() {
        fields.insert("id".to_string(), Value::from(id));
    }
    validate_shape(kind, &record)?;

    let stored = ctx
        .storage
        .update_record(kind, record)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(kind.collection_name(), id))?;
    Ok(ChangeNotification {
        collection: kind,
        op: ChangeOp::Update,
        record: stored,
    })
}

pub async fn delete_record(
    ctx: &ApiContext,
    collection: &str,
    id: i64,
) -> Result<ChangeNotification, ApiError> {
    let kind = parse_collection(collection)?;
    let removed = ctx
        .storage
        .delete_record(kind, EntityId(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(kind.collection_name(), id))?;
    Ok(ChangeNotification {
        collection: kind,
        op: ChangeOp::Delete,
        record: removed,
    })
}

pub async fn get_object(ctx: &ApiContext, object_path: &str) -> Result<Vec<u8>, ApiError> {
    ensure_object_path(object_path)?;
    ctx.objects
        .get(object_path)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("object '{object_path}' not found"),
            )
        })
}

pub async fn put_object(ctx: &ApiContext, object_path: &str, bytes: &[u8]) -> Result<(), ApiError> {
    ensure_object_path(object_path)?;
    if bytes.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "object body cannot be empty",
        ));
    }
    ctx.objects.put(object_path, bytes).await.map_err(internal)
}

fn ensure_object_path(object_path: &str) -> Result<(), ApiError> {
    normalize_object_path(object_path)
        .map(|_| ())
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::Validation,
                format!("invalid object path '{object_path}'"),
            )
        })
}

/// Checks a record against the typed shape of its collection. Relationship
/// rows must link exactly two entities.
fn validate_shape(kind: EntityKind, record: &Value) -> Result<(), ApiError> {
    if !record.is_object() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{kind} record must be a JSON object"),
        ));
    }

    match kind {
        EntityKind::Machines => check::<Machine>(record),
        EntityKind::Muscles => check::<Muscle>(record),
        EntityKind::Exercises => check::<Exercise>(record),
        EntityKind::Workouts => check::<Workout>(record),
        EntityKind::Locations => check::<Location>(record),
        EntityKind::Settings => check::<Setting>(record),
        EntityKind::WorkoutExercises => check::<WorkoutExercise>(record),
        EntityKind::Relationships => {
            let relationship: Relationship = parse(record)?;
            let linked: Vec<&str> = [
                RelationshipField::Muscle,
                RelationshipField::Exercise,
                RelationshipField::Machine,
            ]
            .into_iter()
            .filter(|field| relationship.get(*field).is_some())
            .map(RelationshipField::field_name)
            .collect();
            if linked.len() != 2 {
                return Err(ApiError::new(
                    ErrorCode::Validation,
                    format!(
                        "relationship must link exactly two entities, found [{}]",
                        linked.join(", ")
                    ),
                ));
            }
            Ok(())
        }
    }
}

fn check<T: Entity>(record: &Value) -> Result<(), ApiError> {
    parse::<T>(record).map(|_| ())
}

fn parse<T: Entity>(record: &Value) -> Result<T, ApiError> {
    from_record::<T>(record.clone()).map_err(|e| {
        ApiError::new(
            ErrorCode::Validation,
            format!("invalid {} record: {e}", T::KIND),
        )
    })
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
