use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    fetch_all_records, forward_changes, image_path, load_image, DataClient, EditOutcome,
    HttpDataClient, Navigator, RelationshipEditor,
};
use shared::{
    domain::{EntityId, EntityKind},
    protocol::{AppEvent, PageType},
};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch one navigation event and print the resulting route.
    Route {
        #[arg(long)]
        page: String,
        #[arg(long)]
        action: Option<String>,
        #[arg(long, default_value = "")]
        entity: String,
        #[arg(long)]
        id: Option<i64>,
        /// Workout the builder adds exercises to.
        #[arg(long)]
        workout: Option<i64>,
    },
    /// Print every record of a collection as JSON lines.
    List { collection: EntityKind },
    /// Edit the relationships of one muscle, exercise or machine.
    Relate {
        key_kind: EntityKind,
        key_id: i64,
        partner_kind: EntityKind,
        #[arg(long, value_delimiter = ',')]
        add: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        remove: Vec<i64>,
        /// Keep the edits. Without it they are rolled back.
        #[arg(long)]
        commit: bool,
    },
    /// Fetch an entity image, falling back to the base image.
    Image {
        kind: EntityKind,
        display_num: i64,
        #[arg(long)]
        detail: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print change notifications as navigation events.
    Watch {
        #[arg(long)]
        collection: Option<EntityKind>,
        #[arg(long, default_value = "LIST")]
        page: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let client = Arc::new(HttpDataClient::new(args.server_url));

    match args.command {
        Command::Route {
            page,
            action,
            entity,
            id,
            workout,
        } => {
            let mut navigator = Navigator::new(client);
            if let Some(workout) = workout {
                navigator.selections_mut().remember("workouts", workout);
            }
            let event = AppEvent {
                entity,
                action_type: action.as_deref().map(Into::into),
                page_type: PageType::from(page.as_str()),
                entity_id: id.map(EntityId),
                entity_data: None,
            };
            println!("{}", navigator.dispatch(&event).await);
        }
        Command::List { collection } => {
            for record in fetch_all_records(client.as_ref(), collection).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Relate {
            key_kind,
            key_id,
            partner_kind,
            add,
            remove,
            commit,
        } => {
            let mut editor =
                RelationshipEditor::new(client, key_kind, partner_kind, EntityId(key_id))?;
            if editor.load().await == EditOutcome::Failed {
                bail!("could not load {partner_kind} related to {key_kind} {key_id}");
            }
            for partner in add {
                let outcome = editor.add_partner(EntityId(partner)).await;
                println!("add {partner_kind} {partner}: {outcome:?}");
            }
            for partner in remove {
                let outcome = editor.remove_partner(EntityId(partner)).await;
                println!("remove {partner_kind} {partner}: {outcome:?}");
            }

            if commit {
                info!(saved = editor.save_relationships(), "relationships kept");
            } else {
                let report = editor.cancel_relationships().await;
                info!(reverted = report.reverted, failed = report.failed, "relationships rolled back");
            }
            for partner in editor.mapped() {
                println!("{}\t{}", partner.id, partner.name);
            }
        }
        Command::Image {
            kind,
            display_num,
            detail,
            out,
        } => {
            let path = image_path(kind, display_num, detail.as_deref());
            let Some(bytes) =
                load_image(client.as_ref(), kind, display_num, detail.as_deref()).await?
            else {
                bail!("no image stored at {path}");
            };
            match out {
                Some(out) => {
                    tokio::fs::write(&out, &bytes)
                        .await
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    println!("wrote {} bytes to {}", bytes.len(), out.display());
                }
                None => println!("{path}: {} bytes", bytes.len()),
            }
        }
        Command::Watch { collection, page } => {
            let feed = client.connect_changes().await?;
            let (events_tx, mut events_rx) = watch::channel(None);
            tokio::spawn(forward_changes(
                client.subscribe(),
                collection,
                PageType::from(page.as_str()),
                events_tx,
            ));
            while events_rx.changed().await.is_ok() {
                if let Some(event) = events_rx.borrow_and_update().clone() {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
            feed.abort();
        }
    }

    Ok(())
}
