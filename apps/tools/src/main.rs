use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use shared::domain::{EntityId, EntityKind, Relationship, RelationshipField};
use storage::{FsObjectStore, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://data/gym.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert one JSON record. The id is allocated when absent or taken.
    Insert {
        collection: EntityKind,
        record: String,
    },
    /// Link two entities of different kinds.
    Relate {
        kind_a: EntityKind,
        id_a: i64,
        kind_b: EntityKind,
        id_b: i64,
    },
    /// Print record counts per collection.
    Count,
    /// Load a small demo gym.
    SeedDemo,
    /// Copy a local file into object storage.
    PutObject {
        #[arg(long, default_value = "data/objects")]
        storage_root: PathBuf,
        path: String,
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::PutObject {
            storage_root,
            path,
            file,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            FsObjectStore::new(storage_root).put(&path, &bytes).await?;
            println!("stored {path} ({} bytes)", bytes.len());
        }
        command => {
            let storage = Storage::new(&cli.database_url).await?;
            run(&storage, command).await?;
        }
    }

    Ok(())
}

async fn run(storage: &Storage, command: Command) -> Result<()> {
    match command {
        Command::Insert { collection, record } => {
            let record: Value =
                serde_json::from_str(&record).context("record must be a JSON object")?;
            let stored = storage.insert_record(collection, record).await?;
            println!("created {collection} id={}", stored["id"]);
        }
        Command::Relate {
            kind_a,
            id_a,
            kind_b,
            id_b,
        } => {
            let stored = relate(storage, kind_a, id_a, kind_b, id_b).await?;
            println!("created relationship id={}", stored["id"]);
        }
        Command::Count => {
            for kind in EntityKind::ALL {
                println!("{kind}\t{}", storage.count_records(kind).await?);
            }
        }
        Command::SeedDemo => {
            seed_demo(storage).await?;
            println!("demo gym loaded");
        }
        Command::PutObject { .. } => return Err(anyhow!("put-object does not open the database")),
    }
    Ok(())
}

async fn relate(
    storage: &Storage,
    kind_a: EntityKind,
    id_a: i64,
    kind_b: EntityKind,
    id_b: i64,
) -> Result<Value> {
    let field = |kind: EntityKind| {
        RelationshipField::for_kind(kind).ok_or_else(|| anyhow!("{kind} cannot be related"))
    };
    let (field_a, field_b) = (field(kind_a)?, field(kind_b)?);
    if field_a == field_b {
        return Err(anyhow!("cannot relate {kind_a} to itself"));
    }

    let mut relationship = serde_json::to_value(Relationship::linking(
        EntityId(0),
        field_a,
        EntityId(id_a),
        field_b,
        EntityId(id_b),
    ))?;
    if let Some(fields) = relationship.as_object_mut() {
        fields.remove("id");
    }
    storage
        .insert_record(EntityKind::Relationships, relationship)
        .await
}

async fn seed_demo(storage: &Storage) -> Result<()> {
    let records = [
        (EntityKind::Locations, json!({ "id": 1, "name": "Main Floor" })),
        (
            EntityKind::Machines,
            json!({ "id": 1, "name": "Cable Tower", "displayNum": 1, "locationId": 1 }),
        ),
        (
            EntityKind::Machines,
            json!({ "id": 2, "name": "Leg Press", "displayNum": 2, "locationId": 1 }),
        ),
        (
            EntityKind::Muscles,
            json!({ "id": 1, "name": "Pectoralis Major", "conciseName": "Chest", "displayNum": 1 }),
        ),
        (
            EntityKind::Muscles,
            json!({ "id": 2, "name": "Quadriceps", "conciseName": "Quads", "displayNum": 2 }),
        ),
        (EntityKind::Exercises, json!({ "id": 1, "name": "Cable Fly", "displayNum": 1 })),
        (EntityKind::Exercises, json!({ "id": 2, "name": "Leg Press", "displayNum": 2 })),
        (EntityKind::Workouts, json!({ "id": 1, "name": "Full Body" })),
    ];
    for (kind, record) in records {
        storage.insert_record(kind, record).await?;
    }

    for (kind_a, id_a, kind_b, id_b) in [
        (EntityKind::Machines, 1, EntityKind::Muscles, 1),
        (EntityKind::Machines, 1, EntityKind::Exercises, 1),
        (EntityKind::Exercises, 1, EntityKind::Muscles, 1),
        (EntityKind::Machines, 2, EntityKind::Muscles, 2),
        (EntityKind::Machines, 2, EntityKind::Exercises, 2),
        (EntityKind::Exercises, 2, EntityKind::Muscles, 2),
    ] {
        relate(storage, kind_a, id_a, kind_b, id_b).await?;
    }
    Ok(())
}
