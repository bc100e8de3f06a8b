use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use relate_kernel_core::{
    suggest_duplicates, Channel, Contact, ContactId, DedupeSuggestion, Note, WorkspaceId,
};
use relate_kernel_store_memory::{
    merge_contacts, Commitment, CommitmentParty, CommitmentStatus, CommunityMembership,
    InteractionParticipant, MergeRequest, NeedOffer, NeedOfferKind, NeedOfferStatus, PartyRole,
    RelateStore, RelationshipEdge,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AddContactRequest {
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub city: Option<String>,
    pub tier: Option<String>,
    pub trust_score: Option<f64>,
    pub introduced_by: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub communities: Vec<String>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PartyInput {
    pub contact_id: ContactId,
    pub role: PartyRole,
}

/// Full relation view for one workspace, used by listing surfaces and tests.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RelationsView {
    pub memberships: Vec<CommunityMembership>,
    pub participants: Vec<InteractionParticipant>,
    pub commitments: Vec<Commitment>,
    pub commitment_parties: Vec<CommitmentParty>,
    pub needs_offers: Vec<NeedOffer>,
    pub edges: Vec<RelationshipEdge>,
}

/// Operation facade over one JSON state file. Each call loads the store,
/// performs the operation, and persists on success; a failed merge leaves
/// the file untouched. The load-act-save cycle keeps one operation exclusive
/// per process; multi-process callers must serialize externally.
#[derive(Debug, Clone)]
pub struct RelateApi {
    state_path: PathBuf,
}

impl RelateApi {
    #[must_use]
    pub fn new(state_path: PathBuf) -> Self {
        Self { state_path }
    }

    fn load_store(&self) -> Result<RelateStore> {
        if !self.state_path.exists() {
            return Ok(RelateStore::new());
        }
        let body = fs::read_to_string(&self.state_path).with_context(|| {
            format!("failed to read state file {}", self.state_path.display())
        })?;
        serde_json::from_str(&body).with_context(|| {
            format!("state file {} is not valid store JSON", self.state_path.display())
        })
    }

    fn save_store(&self, store: &RelateStore) -> Result<()> {
        let body = serde_json::to_string_pretty(store).context("failed to serialize store")?;
        if let Some(parent) = self.state_path.parent().filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }
        fs::write(&self.state_path, body).with_context(|| {
            format!("failed to write state file {}", self.state_path.display())
        })
    }

    /// Write an empty store, replacing whatever the state file held.
    ///
    /// # Errors
    /// Returns an error when the state file cannot be written.
    pub fn reset(&self) -> Result<()> {
        self.save_store(&RelateStore::new())
    }

    /// # Errors
    /// Returns an error when the record fails validation or persistence.
    pub fn add_contact(&self, input: AddContactRequest) -> Result<Contact> {
        let mut store = self.load_store()?;
        let now = OffsetDateTime::now_utc();
        let contact = Contact {
            id: ContactId::new(),
            workspace_id: input.workspace_id,
            name: input.name.trim().to_string(),
            city: input.city,
            tier: input.tier,
            trust_score: input.trust_score,
            introduced_by: input.introduced_by,
            aliases: input.aliases,
            tags: input.tags,
            organizations: input.organizations,
            communities: input.communities,
            channels: input.channels,
            notes: input
                .notes
                .into_iter()
                .map(|content| Note { content, created_at: now })
                .collect(),
            created_at: now,
            updated_at: now,
        };
        contact.validate()?;
        store.contacts.put(contact.clone())?;
        self.save_store(&store)?;
        Ok(contact)
    }

    /// # Errors
    /// Returns an error when the state file cannot be loaded.
    pub fn list_contacts(&self, workspace_id: WorkspaceId) -> Result<Vec<Contact>> {
        let store = self.load_store()?;
        Ok(store.contacts.list_all(workspace_id))
    }

    /// # Errors
    /// Returns an error when the contact does not resolve in the workspace.
    pub fn get_contact(&self, workspace_id: WorkspaceId, contact_id: ContactId) -> Result<Contact> {
        let store = self.load_store()?;
        store
            .contacts
            .get(workspace_id, contact_id)
            .cloned()
            .ok_or_else(|| anyhow!("contact not found: {contact_id}"))
    }

    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_membership(
        &self,
        workspace_id: WorkspaceId,
        community_id: &str,
        contact_id: ContactId,
        role: Option<String>,
    ) -> Result<CommunityMembership> {
        let mut store = self.load_store()?;
        let membership = store.memberships.create(workspace_id, community_id, contact_id, role);
        self.save_store(&store)?;
        Ok(membership)
    }

    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_participant(
        &self,
        workspace_id: WorkspaceId,
        interaction_id: &str,
        contact_id: ContactId,
        role: Option<String>,
    ) -> Result<InteractionParticipant> {
        let mut store = self.load_store()?;
        let participant = store.participants.create(workspace_id, interaction_id, contact_id, role);
        self.save_store(&store)?;
        Ok(participant)
    }

    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_commitment(
        &self,
        workspace_id: WorkspaceId,
        title: &str,
        status: CommitmentStatus,
        parties: &[PartyInput],
    ) -> Result<Commitment> {
        let mut store = self.load_store()?;
        let party_pairs: Vec<(ContactId, PartyRole)> =
            parties.iter().map(|party| (party.contact_id, party.role)).collect();
        let commitment = store.commitments.create(workspace_id, title, status, &party_pairs);
        self.save_store(&store)?;
        Ok(commitment)
    }

    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_need_offer(
        &self,
        workspace_id: WorkspaceId,
        contact_id: ContactId,
        kind: NeedOfferKind,
        status: NeedOfferStatus,
    ) -> Result<NeedOffer> {
        let mut store = self.load_store()?;
        let record = store.needs_offers.create(workspace_id, contact_id, kind, status);
        self.save_store(&store)?;
        Ok(record)
    }

    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_edge(
        &self,
        workspace_id: WorkspaceId,
        from_contact_id: ContactId,
        to_contact_id: ContactId,
        introduced_by_contact_id: Option<ContactId>,
    ) -> Result<RelationshipEdge> {
        let mut store = self.load_store()?;
        let edge = store.edges.create(
            workspace_id,
            from_contact_id,
            to_contact_id,
            introduced_by_contact_id,
        );
        self.save_store(&store)?;
        Ok(edge)
    }

    /// # Errors
    /// Returns an error when the state file cannot be loaded.
    pub fn relations(&self, workspace_id: WorkspaceId) -> Result<RelationsView> {
        let store = self.load_store()?;
        Ok(RelationsView {
            memberships: store.memberships.list(workspace_id),
            participants: store.participants.list(workspace_id),
            commitments: store.commitments.list(workspace_id),
            commitment_parties: store.commitments.parties(workspace_id),
            needs_offers: store.needs_offers.list(workspace_id),
            edges: store.edges.list(workspace_id),
        })
    }

    /// Recompute duplicate suggestions for the workspace. Read-only; the
    /// state file is never rewritten by a scan.
    ///
    /// # Errors
    /// Returns an error when the state file cannot be loaded.
    pub fn scan_duplicates(&self, workspace_id: WorkspaceId) -> Result<Vec<DedupeSuggestion>> {
        let store = self.load_store()?;
        Ok(suggest_duplicates(&store.contacts.list_all(workspace_id)))
    }

    /// Execute one merge. The state file is rewritten only when the merge
    /// commits; a rolled-back merge leaves it byte-identical.
    ///
    /// # Errors
    /// Returns an error when the merge fails (validation, reassignment, or
    /// verification) or when persistence fails.
    pub fn merge(&self, request: &MergeRequest) -> Result<Contact> {
        let mut store = self.load_store()?;
        let merged = merge_contacts(&mut store, request)?;
        self.save_store(&store)?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("relatekernel-api-{}.json", ulid::Ulid::new()))
    }

    fn contact_request(workspace_id: WorkspaceId, name: &str) -> AddContactRequest {
        AddContactRequest {
            workspace_id,
            name: name.to_string(),
            ..AddContactRequest::default()
        }
    }

    #[test]
    fn api_add_list_and_show_round_trip() -> Result<()> {
        let state_path = unique_temp_state_path();
        let api = RelateApi::new(state_path.clone());
        let workspace = WorkspaceId::new();

        let created = api.add_contact(contact_request(workspace, "Alpha Ivanova"))?;
        let listed = api.list_contacts(workspace)?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);

        let shown = api.get_contact(workspace, created.id)?;
        assert_eq!(shown.name, "Alpha Ivanova");

        let _ = fs::remove_file(&state_path);
        Ok(())
    }

    #[test]
    fn api_missing_state_file_reads_as_empty_store() -> Result<()> {
        let state_path = unique_temp_state_path();
        let api = RelateApi::new(state_path);

        let listed = api.list_contacts(WorkspaceId::new())?;
        assert!(listed.is_empty());
        Ok(())
    }

    #[test]
    fn api_failed_merge_leaves_state_file_untouched() -> Result<()> {
        let state_path = unique_temp_state_path();
        let api = RelateApi::new(state_path.clone());
        let workspace = WorkspaceId::new();
        let survivor = api.add_contact(contact_request(workspace, "Alpha Ivanova"))?;
        let before = fs::read(&state_path)?;

        let outcome = api.merge(&MergeRequest {
            workspace_id: workspace,
            survivor_id: survivor.id,
            source_ids: vec![ContactId::new()],
            selection: None,
        });
        assert!(outcome.is_err());
        assert_eq!(fs::read(&state_path)?, before);

        let _ = fs::remove_file(&state_path);
        Ok(())
    }
}
