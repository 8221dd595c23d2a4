use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EntityId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "machines")]
    Machines,
    #[serde(rename = "muscles")]
    Muscles,
    #[serde(rename = "exercises")]
    Exercises,
    #[serde(rename = "workouts")]
    Workouts,
    #[serde(rename = "locations")]
    Locations,
    #[serde(rename = "settings")]
    Settings,
    #[serde(rename = "relationships")]
    Relationships,
    #[serde(rename = "workoutExercises")]
    WorkoutExercises,
}

#[derive(Debug, Error)]
#[error("unknown entity collection '{0}'")]
pub struct UnknownEntityKind(pub String);

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Machines,
        EntityKind::Muscles,
        EntityKind::Exercises,
        EntityKind::Workouts,
        EntityKind::Locations,
        EntityKind::Settings,
        EntityKind::Relationships,
        EntityKind::WorkoutExercises,
    ];

    /// Wire name of the collection, also the first route segment.
    pub fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Machines => "machines",
            EntityKind::Muscles => "muscles",
            EntityKind::Exercises => "exercises",
            EntityKind::Workouts => "workouts",
            EntityKind::Locations => "locations",
            EntityKind::Settings => "settings",
            EntityKind::Relationships => "relationships",
            EntityKind::WorkoutExercises => "workoutExercises",
        }
    }

    /// Singular name used in object storage paths.
    pub fn image_type(self) -> &'static str {
        match self {
            EntityKind::Machines => "machine",
            EntityKind::Muscles => "muscle",
            EntityKind::Exercises => "exercise",
            EntityKind::Workouts => "workout",
            EntityKind::Locations => "location",
            EntityKind::Settings => "setting",
            EntityKind::Relationships => "relationship",
            EntityKind::WorkoutExercises => "workoutExercise",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.collection_name() == s)
            .ok_or_else(|| UnknownEntityKind(s.to_string()))
    }
}

/// A typed record living in one of the data API collections.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;
}

pub fn to_record<T: Entity>(entity: &T) -> serde_json::Result<Value> {
    serde_json::to_value(entity)
}

pub fn from_record<T: Entity>(record: Value) -> serde_json::Result<T> {
    serde_json::from_value(record)
}

/// Reads the `id` field of an untyped record.
pub fn record_id(record: &Value) -> Option<EntityId> {
    record.get("id").and_then(Value::as_i64).map(EntityId)
}

macro_rules! entity_impl {
    ($ty:ident, $kind:expr) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> EntityId {
                self.id
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Muscle {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concise_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Join row for one exercise placed in a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    pub id: EntityId,
    pub workout_id: EntityId,
    pub exercise_id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// Join row linking two of muscles, exercises and machines. Only the two
/// fields of the related pair are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: EntityId,
    #[serde(default)]
    pub muscle_id: Option<EntityId>,
    #[serde(default)]
    pub exercise_id: Option<EntityId>,
    #[serde(default)]
    pub machine_id: Option<EntityId>,
}

entity_impl!(Machine, EntityKind::Machines);
entity_impl!(Muscle, EntityKind::Muscles);
entity_impl!(Exercise, EntityKind::Exercises);
entity_impl!(Workout, EntityKind::Workouts);
entity_impl!(Location, EntityKind::Locations);
entity_impl!(Setting, EntityKind::Settings);
entity_impl!(Relationship, EntityKind::Relationships);
entity_impl!(WorkoutExercise, EntityKind::WorkoutExercises);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipField {
    Muscle,
    Exercise,
    Machine,
}

impl RelationshipField {
    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Muscles => Some(RelationshipField::Muscle),
            EntityKind::Exercises => Some(RelationshipField::Exercise),
            EntityKind::Machines => Some(RelationshipField::Machine),
            _ => None,
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            RelationshipField::Muscle => "muscleId",
            RelationshipField::Exercise => "exerciseId",
            RelationshipField::Machine => "machineId",
        }
    }
}

impl Relationship {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            muscle_id: None,
            exercise_id: None,
            machine_id: None,
        }
    }

    pub fn linking(
        id: EntityId,
        key_field: RelationshipField,
        key_id: EntityId,
        partner_field: RelationshipField,
        partner_id: EntityId,
    ) -> Self {
        let mut relationship = Self::new(id);
        relationship.set(key_field, Some(key_id));
        relationship.set(partner_field, Some(partner_id));
        relationship
    }

    pub fn get(&self, field: RelationshipField) -> Option<EntityId> {
        match field {
            RelationshipField::Muscle => self.muscle_id,
            RelationshipField::Exercise => self.exercise_id,
            RelationshipField::Machine => self.machine_id,
        }
    }

    pub fn set(&mut self, field: RelationshipField, value: Option<EntityId>) {
        match field {
            RelationshipField::Muscle => self.muscle_id = value,
            RelationshipField::Exercise => self.exercise_id = value,
            RelationshipField::Machine => self.machine_id = value,
        }
    }
}
