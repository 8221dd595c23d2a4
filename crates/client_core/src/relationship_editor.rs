//! Many-to-many relationship editing against a data API without multi-row
//! transactions.
//!
//! Every add/remove is written to the data API immediately and recorded in an
//! undo journal. Saving clears the journal; cancelling replays it backwards
//! with each entry's inverse operation. An editor dropped with a non-empty
//! journal rolls back on the current runtime.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{from_record, EntityId, EntityKind, Relationship, RelationshipField};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    data_client::{create_entity, fetch_all_records, DataClient},
    entity_store::EntityStore,
};

/// The fields of a machine, muscle or exercise an editor needs to show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSummary {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_num: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Create(Relationship),
    Delete(EntityId),
}

impl RemoteOp {
    /// Runs the operation. A create yields the relationship as stored.
    pub async fn execute(&self, client: &dyn DataClient) -> Result<Option<Relationship>> {
        match self {
            RemoteOp::Create(relationship) => {
                Ok(Some(create_entity(client, relationship).await?))
            }
            RemoteOp::Delete(id) => {
                client.delete(EntityKind::Relationships, *id).await?;
                Ok(None)
            }
        }
    }
}

/// One applied edit, with enough data to reverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    New {
        relationship: Relationship,
    },
    Delete {
        relationship_id: EntityId,
        relationship: Relationship,
    },
}

impl UndoEntry {
    /// The remote effect the edit had.
    pub fn apply(&self) -> RemoteOp {
        match self {
            UndoEntry::New { relationship } => RemoteOp::Create(relationship.clone()),
            UndoEntry::Delete {
                relationship_id, ..
            } => RemoteOp::Delete(*relationship_id),
        }
    }

    /// The remote effect that reverses the edit.
    pub fn invert(&self) -> RemoteOp {
        match self {
            UndoEntry::New { relationship } => RemoteOp::Delete(relationship.id),
            UndoEntry::Delete { relationship, .. } => RemoteOp::Create(relationship.clone()),
        }
    }

    fn relationship(&self) -> &Relationship {
        match self {
            UndoEntry::New { relationship } | UndoEntry::Delete { relationship, .. } => {
                relationship
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub reverted: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("{0} cannot take part in a relationship")]
    Unrelatable(EntityKind),
    #[error("cannot relate {0} to itself")]
    SameKind(EntityKind),
}

/// Save/cancel surface a parent form drives.
#[async_trait]
pub trait RelationshipHandle: Send {
    /// Commits pending edits and returns how many there were.
    fn save_relationships(&mut self) -> usize;
    async fn cancel_relationships(&mut self) -> RollbackReport;
}

pub struct RelationshipEditor {
    client: Arc<dyn DataClient>,
    key_kind: EntityKind,
    partner_kind: EntityKind,
    key_field: RelationshipField,
    partner_field: RelationshipField,
    key_id: EntityId,
    relationships: EntityStore<Relationship>,
    mapped: Vec<PartnerSummary>,
    candidates: Vec<PartnerSummary>,
    journal: Vec<UndoEntry>,
}

impl RelationshipEditor {
    pub fn new(
        client: Arc<dyn DataClient>,
        key_kind: EntityKind,
        partner_kind: EntityKind,
        key_id: EntityId,
    ) -> Result<Self, EditorError> {
        let key_field =
            RelationshipField::for_kind(key_kind).ok_or(EditorError::Unrelatable(key_kind))?;
        let partner_field = RelationshipField::for_kind(partner_kind)
            .ok_or(EditorError::Unrelatable(partner_kind))?;
        if key_field == partner_field {
            return Err(EditorError::SameKind(key_kind));
        }

        Ok(Self {
            client,
            key_kind,
            partner_kind,
            key_field,
            partner_field,
            key_id,
            relationships: EntityStore::new(),
            mapped: Vec::new(),
            candidates: Vec::new(),
            journal: Vec::new(),
        })
    }

    pub fn key_id(&self) -> EntityId {
        self.key_id
    }

    /// Partners currently related to the key entity.
    pub fn mapped(&self) -> &[PartnerSummary] {
        &self.mapped
    }

    /// Every partner entity, for the "add" selector.
    pub fn candidates(&self) -> &[PartnerSummary] {
        &self.candidates
    }

    /// Candidates not yet related to the key entity.
    pub fn available(&self) -> impl Iterator<Item = &PartnerSummary> {
        self.candidates
            .iter()
            .filter(move |candidate| !self.is_mapped(candidate.id))
    }

    pub fn pending(&self) -> &[UndoEntry] {
        &self.journal
    }

    pub fn has_pending(&self) -> bool {
        !self.journal.is_empty()
    }

    pub fn is_mapped(&self, partner_id: EntityId) -> bool {
        self.mapped.iter().any(|partner| partner.id == partner_id)
    }

    /// Fetches relationship rows and partner entities and rebuilds the
    /// mapping. On failure the mapping is left empty.
    pub async fn load(&mut self) -> EditOutcome {
        self.relationships = EntityStore::new();
        self.mapped.clear();
        self.candidates.clear();

        match self.fetch().await {
            Ok((relationships, candidates)) => {
                self.mapped = relationships
                    .iter()
                    .filter(|rel| rel.get(self.key_field) == Some(self.key_id))
                    .filter_map(|rel| {
                        let partner_id = rel.get(self.partner_field)?;
                        let partner = candidates.iter().find(|c| c.id == partner_id);
                        if partner.is_none() {
                            warn!(
                                relationship_id = %rel.id,
                                partner = %self.partner_kind,
                                %partner_id,
                                "editor: relationship points at a missing partner"
                            );
                        }
                        partner.cloned()
                    })
                    .collect();
                self.relationships = relationships;
                self.candidates = candidates;
                debug!(
                    key = %self.key_kind,
                    key_id = %self.key_id,
                    partner = %self.partner_kind,
                    mapped = self.mapped.len(),
                    "editor: loaded"
                );
                EditOutcome::Applied
            }
            Err(error) => {
                error!(
                    key = %self.key_kind,
                    key_id = %self.key_id,
                    partner = %self.partner_kind,
                    error = %format!("{error:#}"),
                    "editor: load failed"
                );
                EditOutcome::Failed
            }
        }
    }

    async fn fetch(&self) -> Result<(EntityStore<Relationship>, Vec<PartnerSummary>)> {
        let relationships = EntityStore::<Relationship>::fetch_all(self.client.as_ref()).await?;
        let candidates = fetch_all_records(self.client.as_ref(), self.partner_kind)
            .await?
            .into_iter()
            .map(serde_json::from_value::<PartnerSummary>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((relationships, candidates))
    }

    pub async fn add_partner(&mut self, partner_id: EntityId) -> EditOutcome {
        if self.is_mapped(partner_id) {
            warn!(
                key_id = %self.key_id,
                partner = %self.partner_kind,
                %partner_id,
                "editor: relationship already exists"
            );
            return EditOutcome::Skipped;
        }
        let Some(partner) = self.candidates.iter().find(|c| c.id == partner_id).cloned() else {
            warn!(
                partner = %self.partner_kind,
                %partner_id,
                "editor: unknown partner"
            );
            return EditOutcome::Skipped;
        };

        let draft = Relationship::linking(
            self.relationships.next_id(),
            self.key_field,
            self.key_id,
            self.partner_field,
            partner_id,
        );
        match create_entity(self.client.as_ref(), &draft).await {
            Ok(stored) => {
                if stored.id != draft.id {
                    debug!(requested = %draft.id, assigned = %stored.id, "editor: store reassigned relationship id");
                }
                self.relationships.insert(stored.clone());
                self.mapped.push(partner);
                self.journal.push(UndoEntry::New {
                    relationship: stored,
                });
                EditOutcome::Applied
            }
            Err(error) => {
                error!(
                    key_id = %self.key_id,
                    %partner_id,
                    error = %format!("{error:#}"),
                    "editor: failed to create relationship"
                );
                EditOutcome::Failed
            }
        }
    }

    pub async fn remove_partner(&mut self, partner_id: EntityId) -> EditOutcome {
        let Some(relationship) = self
            .relationships
            .iter()
            .find(|rel| {
                rel.get(self.key_field) == Some(self.key_id)
                    && rel.get(self.partner_field) == Some(partner_id)
            })
            .cloned()
        else {
            warn!(
                key_id = %self.key_id,
                %partner_id,
                "editor: no relationship to remove"
            );
            return EditOutcome::Skipped;
        };

        match self
            .client
            .delete(EntityKind::Relationships, relationship.id)
            .await
        {
            Ok(()) => {
                self.relationships.remove(relationship.id);
                self.mapped.retain(|partner| partner.id != partner_id);
                self.journal.push(UndoEntry::Delete {
                    relationship_id: relationship.id,
                    relationship,
                });
                EditOutcome::Applied
            }
            Err(error) => {
                error!(
                    relationship_id = %relationship.id,
                    error = %format!("{error:#}"),
                    "editor: failed to delete relationship"
                );
                EditOutcome::Failed
            }
        }
    }

    /// Every journaled edit is already persisted, so committing is only a
    /// matter of forgetting the journal.
    pub fn save_relationships(&mut self) -> usize {
        let committed = self.journal.len();
        if committed == 0 {
            debug!(key_id = %self.key_id, "editor: nothing to save");
            return 0;
        }
        self.journal.clear();
        info!(key_id = %self.key_id, committed, "editor: relationships saved");
        committed
    }

    /// Reverses every journaled edit, newest first, and clears the journal.
    pub async fn cancel_relationships(&mut self) -> RollbackReport {
        let entries = std::mem::take(&mut self.journal);
        if entries.is_empty() {
            return RollbackReport::default();
        }

        let mut report = RollbackReport::default();
        let mut remapped: HashMap<EntityId, EntityId> = HashMap::new();
        for entry in entries.iter().rev() {
            match revert_entry(self.client.as_ref(), entry, &mut remapped).await {
                Ok(restored) => {
                    report.reverted += 1;
                    self.restore_local(entry, restored, &remapped);
                }
                Err(error) => {
                    report.failed += 1;
                    error!(
                        relationship_id = %entry.relationship().id,
                        error = %format!("{error:#}"),
                        "editor: rollback step failed"
                    );
                }
            }
        }

        info!(
            key_id = %self.key_id,
            reverted = report.reverted,
            failed = report.failed,
            "editor: relationships rolled back"
        );
        report
    }

    fn restore_local(
        &mut self,
        entry: &UndoEntry,
        restored: Option<Relationship>,
        remapped: &HashMap<EntityId, EntityId>,
    ) {
        let partner_id = entry.relationship().get(self.partner_field);
        match (entry, restored) {
            (UndoEntry::New { relationship }, _) => {
                let id = remapped
                    .get(&relationship.id)
                    .copied()
                    .unwrap_or(relationship.id);
                self.relationships.remove(id);
                self.mapped
                    .retain(|partner| Some(partner.id) != partner_id);
            }
            (UndoEntry::Delete { .. }, Some(stored)) => {
                self.relationships.insert(stored);
                if let Some(partner_id) = partner_id {
                    if !self.is_mapped(partner_id) {
                        if let Some(partner) =
                            self.candidates.iter().find(|c| c.id == partner_id).cloned()
                        {
                            self.mapped.push(partner);
                        }
                    }
                }
            }
            (UndoEntry::Delete { .. }, None) => {}
        }
    }

    /// Rolls back pending edits, then drops the editor.
    pub async fn close(mut self) -> RollbackReport {
        self.cancel_relationships().await
    }
}

/// Runs the inverse of `entry`. A re-created row can come back with a new id;
/// `remapped` tracks that so later entries delete the right row.
async fn revert_entry(
    client: &dyn DataClient,
    entry: &UndoEntry,
    remapped: &mut HashMap<EntityId, EntityId>,
) -> Result<Option<Relationship>> {
    let op = match entry.invert() {
        RemoteOp::Delete(id) => RemoteOp::Delete(remapped.get(&id).copied().unwrap_or(id)),
        create => create,
    };
    let restored = op.execute(client).await?;
    if let Some(stored) = &restored {
        let original = entry.relationship().id;
        if stored.id != original {
            remapped.insert(original, stored.id);
        }
    }
    Ok(restored)
}

#[async_trait]
impl RelationshipHandle for RelationshipEditor {
    fn save_relationships(&mut self) -> usize {
        RelationshipEditor::save_relationships(self)
    }

    async fn cancel_relationships(&mut self) -> RollbackReport {
        RelationshipEditor::cancel_relationships(self).await
    }
}

impl Drop for RelationshipEditor {
    fn drop(&mut self) {
        if self.journal.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.journal);
        let key_id = self.key_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%key_id, pending = entries.len(), "editor: dropped with pending edits; rolling back");
                let client = Arc::clone(&self.client);
                handle.spawn(async move {
                    let mut remapped = HashMap::new();
                    for entry in entries.iter().rev() {
                        if let Err(error) =
                            revert_entry(client.as_ref(), entry, &mut remapped).await
                        {
                            error!(
                                %key_id,
                                relationship_id = %entry.relationship().id,
                                error = %format!("{error:#}"),
                                "editor: rollback on drop failed"
                            );
                        }
                    }
                });
            }
            Err(_) => error!(
                %key_id,
                pending = entries.len(),
                "editor: dropped outside a runtime; pending edits cannot be rolled back"
            ),
        }
    }
}

/// Fans a parent form's save/cancel out to its child editors.
pub struct RelationshipForm<H: RelationshipHandle = RelationshipEditor> {
    editors: Vec<H>,
}

impl<H: RelationshipHandle> Default for RelationshipForm<H> {
    fn default() -> Self {
        Self {
            editors: Vec::new(),
        }
    }
}

impl<H: RelationshipHandle> RelationshipForm<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, editor: H) -> usize {
        self.editors.push(editor);
        self.editors.len() - 1
    }

    pub fn editor_mut(&mut self, index: usize) -> Option<&mut H> {
        self.editors.get_mut(index)
    }

    pub fn save_all(&mut self) -> usize {
        self.editors
            .iter_mut()
            .map(|editor| editor.save_relationships())
            .sum()
    }

    pub async fn cancel_all(&mut self) -> RollbackReport {
        let mut total = RollbackReport::default();
        for editor in &mut self.editors {
            let report = editor.cancel_relationships().await;
            total.reverted += report.reverted;
            total.failed += report.failed;
        }
        total
    }
}

#[cfg(test)]
#[path = "tests/relationship_editor_tests.rs"]
mod tests;
