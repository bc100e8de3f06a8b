use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use relate_kernel_core::{
    resolve_merged_contact, Contact, ContactId, KernelError, MergeSelection, WorkspaceId,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("malformed {collaborator} record {id}: {detail}")]
    MalformedRecord { collaborator: &'static str, id: RecordId, detail: String },
    #[error("contact {id} already exists in another workspace")]
    WorkspaceMismatch { id: ContactId },
}

/// Merge failure taxonomy. Every variant leaves the store unchanged from the
/// caller's perspective: validation errors are raised before any mutation,
/// and the later classes trigger a full snapshot restore.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum MergeError {
    #[error(transparent)]
    Validation(#[from] KernelError),
    #[error("commit failed: {0}")]
    Commit(#[source] StoreError),
    #[error("reassignment failed: {0}")]
    Reassignment(#[source] StoreError),
    #[error("verification failed: survivor {0} missing after merge")]
    SurvivorMissing(ContactId),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordId(pub Ulid);

impl RecordId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CommunityMembership {
    pub id: RecordId,
    pub workspace_id: WorkspaceId,
    pub community_id: String,
    pub contact_id: ContactId,
    pub role: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct InteractionParticipant {
    pub id: RecordId,
    pub workspace_id: WorkspaceId,
    pub interaction_id: String,
    pub contact_id: ContactId,
    pub role: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    Open,
    InProgress,
    Fulfilled,
    Broken,
    Canceled,
}

impl CommitmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Fulfilled => "fulfilled",
            Self::Broken => "broken",
            Self::Canceled => "canceled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "fulfilled" => Some(Self::Fulfilled),
            "broken" => Some(Self::Broken),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    OwedBy,
    OwesTo,
    Observer,
}

impl PartyRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OwedBy => "owed_by",
            Self::OwesTo => "owes_to",
            Self::Observer => "observer",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owed_by" => Some(Self::OwedBy),
            "owes_to" => Some(Self::OwesTo),
            "observer" => Some(Self::Observer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Commitment {
    pub id: RecordId,
    pub workspace_id: WorkspaceId,
    pub title: String,
    pub status: CommitmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Party on a commitment. The workspace lives on the owning commitment, so
/// workspace checks resolve through `commitment_id`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CommitmentParty {
    pub id: RecordId,
    pub commitment_id: RecordId,
    pub contact_id: ContactId,
    pub role: PartyRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NeedOfferKind {
    Need,
    Offer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NeedOfferStatus {
    Open,
    Matched,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NeedOffer {
    pub id: RecordId,
    pub workspace_id: WorkspaceId,
    pub contact_id: ContactId,
    pub kind: NeedOfferKind,
    pub status: NeedOfferStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RelationshipEdge {
    pub id: RecordId,
    pub workspace_id: WorkspaceId,
    pub from_contact_id: ContactId,
    pub to_contact_id: ContactId,
    pub introduced_by_contact_id: Option<ContactId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactStore {
    contacts: BTreeMap<ContactId, Contact>,
}

impl ContactStore {
    /// Create-or-replace by id. The workspace of an existing record is
    /// immutable: replacing it with a record from another workspace fails.
    ///
    /// # Errors
    /// Returns [`StoreError::WorkspaceMismatch`] on a cross-workspace replace.
    pub fn put(&mut self, contact: Contact) -> Result<(), StoreError> {
        if let Some(existing) = self.contacts.get(&contact.id) {
            if existing.workspace_id != contact.workspace_id {
                return Err(StoreError::WorkspaceMismatch { id: contact.id });
            }
        }
        self.contacts.insert(contact.id, contact);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, workspace_id: WorkspaceId, contact_id: ContactId) -> Option<&Contact> {
        self.contacts
            .get(&contact_id)
            .filter(|contact| contact.workspace_id == workspace_id)
    }

    #[must_use]
    pub fn list_all(&self, workspace_id: WorkspaceId) -> Vec<Contact> {
        self.contacts
            .values()
            .filter(|contact| contact.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Remove a contact, returning the removed record so callers can tell
    /// "not found" apart from "found and deleted".
    pub fn delete(
        &mut self,
        workspace_id: WorkspaceId,
        contact_id: ContactId,
    ) -> Option<Contact> {
        if self.get(workspace_id, contact_id).is_none() {
            return None;
        }
        self.contacts.remove(&contact_id)
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct MembershipStore {
    records: Vec<CommunityMembership>,
}

impl MembershipStore {
    pub fn create(
        &mut self,
        workspace_id: WorkspaceId,
        community_id: impl Into<String>,
        contact_id: ContactId,
        role: Option<String>,
    ) -> CommunityMembership {
        let membership = CommunityMembership {
            id: RecordId::new(),
            workspace_id,
            community_id: community_id.into(),
            contact_id,
            role,
            joined_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.push(membership.clone());
        membership
    }

    #[must_use]
    pub fn list(&self, workspace_id: WorkspaceId) -> Vec<CommunityMembership> {
        self.records
            .iter()
            .filter(|record| record.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Repoint every membership of `from` onto `to` within the workspace.
    /// Idempotent; records of other workspaces are never touched.
    ///
    /// # Errors
    /// Returns [`StoreError::MalformedRecord`] when an affected membership
    /// carries a blank community id; nothing is rewritten in that case.
    pub fn reassign(
        &mut self,
        workspace_id: WorkspaceId,
        from: ContactId,
        to: ContactId,
    ) -> Result<usize, StoreError> {
        for record in self.records.iter().filter(|record| {
            record.workspace_id == workspace_id && record.contact_id == from
        }) {
            if record.community_id.trim().is_empty() {
                return Err(StoreError::MalformedRecord {
                    collaborator: "community membership",
                    id: record.id,
                    detail: "blank community id".to_string(),
                });
            }
        }

        let mut rewritten = 0;
        for record in &mut self.records {
            if record.workspace_id == workspace_id && record.contact_id == from {
                record.contact_id = to;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ParticipantStore {
    records: Vec<InteractionParticipant>,
}

impl ParticipantStore {
    pub fn create(
        &mut self,
        workspace_id: WorkspaceId,
        interaction_id: impl Into<String>,
        contact_id: ContactId,
        role: Option<String>,
    ) -> InteractionParticipant {
        let participant = InteractionParticipant {
            id: RecordId::new(),
            workspace_id,
            interaction_id: interaction_id.into(),
            contact_id,
            role,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.push(participant.clone());
        participant
    }

    #[must_use]
    pub fn list(&self, workspace_id: WorkspaceId) -> Vec<InteractionParticipant> {
        self.records
            .iter()
            .filter(|record| record.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// # Errors
    /// Returns [`StoreError::MalformedRecord`] when an affected participant
    /// carries a blank interaction id; nothing is rewritten in that case.
    pub fn reassign(
        &mut self,
        workspace_id: WorkspaceId,
        from: ContactId,
        to: ContactId,
    ) -> Result<usize, StoreError> {
        for record in self.records.iter().filter(|record| {
            record.workspace_id == workspace_id && record.contact_id == from
        }) {
            if record.interaction_id.trim().is_empty() {
                return Err(StoreError::MalformedRecord {
                    collaborator: "interaction participant",
                    id: record.id,
                    detail: "blank interaction id".to_string(),
                });
            }
        }

        let mut rewritten = 0;
        for record in &mut self.records {
            if record.workspace_id == workspace_id && record.contact_id == from {
                record.contact_id = to;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct CommitmentStore {
    commitments: BTreeMap<RecordId, Commitment>,
    parties: Vec<CommitmentParty>,
}

impl CommitmentStore {
    pub fn create(
        &mut self,
        workspace_id: WorkspaceId,
        title: impl Into<String>,
        status: CommitmentStatus,
        parties: &[(ContactId, PartyRole)],
    ) -> Commitment {
        let commitment = Commitment {
            id: RecordId::new(),
            workspace_id,
            title: title.into(),
            status,
            created_at: OffsetDateTime::now_utc(),
        };
        for (contact_id, role) in parties {
            self.parties.push(CommitmentParty {
                id: RecordId::new(),
                commitment_id: commitment.id,
                contact_id: *contact_id,
                role: *role,
                created_at: commitment.created_at,
            });
        }
        self.commitments.insert(commitment.id, commitment.clone());
        commitment
    }

    #[must_use]
    pub fn list(&self, workspace_id: WorkspaceId) -> Vec<Commitment> {
        self.commitments
            .values()
            .filter(|commitment| commitment.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Parties of every commitment in the workspace.
    #[must_use]
    pub fn parties(&self, workspace_id: WorkspaceId) -> Vec<CommitmentParty> {
        self.parties
            .iter()
            .filter(|party| {
                self.commitments
                    .get(&party.commitment_id)
                    .is_some_and(|commitment| commitment.workspace_id == workspace_id)
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn parties_for_contact(
        &self,
        workspace_id: WorkspaceId,
        contact_id: ContactId,
    ) -> Vec<CommitmentParty> {
        self.parties(workspace_id)
            .into_iter()
            .filter(|party| party.contact_id == contact_id)
            .collect()
    }

    /// Repoint parties of `from` whose owning commitment sits in the
    /// workspace. A party referencing a missing commitment cannot be
    /// workspace-checked and would keep dangling after the merge, so it
    /// fails the reassignment instead of being skipped.
    ///
    /// # Errors
    /// Returns [`StoreError::MalformedRecord`] for a party whose commitment
    /// does not resolve; nothing is rewritten in that case.
    pub fn reassign(
        &mut self,
        workspace_id: WorkspaceId,
        from: ContactId,
        to: ContactId,
    ) -> Result<usize, StoreError> {
        for party in self.parties.iter().filter(|party| party.contact_id == from) {
            if !self.commitments.contains_key(&party.commitment_id) {
                return Err(StoreError::MalformedRecord {
                    collaborator: "commitment party",
                    id: party.id,
                    detail: format!("references missing commitment {}", party.commitment_id),
                });
            }
        }

        let mut rewritten = 0;
        for party in &mut self.parties {
            if party.contact_id != from {
                continue;
            }
            let in_workspace = self
                .commitments
                .get(&party.commitment_id)
                .is_some_and(|commitment| commitment.workspace_id == workspace_id);
            if in_workspace {
                party.contact_id = to;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    pub fn clear(&mut self) {
        self.commitments.clear();
        self.parties.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct NeedOfferStore {
    records: Vec<NeedOffer>,
}

impl NeedOfferStore {
    pub fn create(
        &mut self,
        workspace_id: WorkspaceId,
        contact_id: ContactId,
        kind: NeedOfferKind,
        status: NeedOfferStatus,
    ) -> NeedOffer {
        let record = NeedOffer {
            id: RecordId::new(),
            workspace_id,
            contact_id,
            kind,
            status,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.push(record.clone());
        record
    }

    #[must_use]
    pub fn list(&self, workspace_id: WorkspaceId) -> Vec<NeedOffer> {
        self.records
            .iter()
            .filter(|record| record.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Infallible: need/offer records carry no foreign key beyond the
    /// contact id being rewritten.
    pub fn reassign(&mut self, workspace_id: WorkspaceId, from: ContactId, to: ContactId) -> usize {
        let mut rewritten = 0;
        for record in &mut self.records {
            if record.workspace_id == workspace_id && record.contact_id == from {
                record.contact_id = to;
                rewritten += 1;
            }
        }
        rewritten
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EdgeStore {
    records: Vec<RelationshipEdge>,
}

impl EdgeStore {
    pub fn create(
        &mut self,
        workspace_id: WorkspaceId,
        from_contact_id: ContactId,
        to_contact_id: ContactId,
        introduced_by_contact_id: Option<ContactId>,
    ) -> RelationshipEdge {
        let edge = RelationshipEdge {
            id: RecordId::new(),
            workspace_id,
            from_contact_id,
            to_contact_id,
            introduced_by_contact_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.push(edge.clone());
        edge
    }

    #[must_use]
    pub fn list(&self, workspace_id: WorkspaceId) -> Vec<RelationshipEdge> {
        self.records
            .iter()
            .filter(|record| record.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Repoint all three id-bearing fields independently: `from`, `to`, and
    /// `introduced_by`. Returns the number of edges with at least one field
    /// rewritten.
    pub fn reassign(&mut self, workspace_id: WorkspaceId, from: ContactId, to: ContactId) -> usize {
        let mut rewritten = 0;
        for record in &mut self.records {
            if record.workspace_id != workspace_id {
                continue;
            }
            let mut touched = false;
            if record.from_contact_id == from {
                record.from_contact_id = to;
                touched = true;
            }
            if record.to_contact_id == from {
                record.to_contact_id = to;
                touched = true;
            }
            if record.introduced_by_contact_id == Some(from) {
                record.introduced_by_contact_id = Some(to);
                touched = true;
            }
            if touched {
                rewritten += 1;
            }
        }
        rewritten
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Every collection of the subsystem, owned by one explicit object that is
/// constructed per process or per test — never a process-wide global.
///
/// A `&mut RelateStore` is the concurrency contract: one store can never run
/// two merges at once, and cross-thread callers wrap the store in a mutex.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelateStore {
    pub contacts: ContactStore,
    pub memberships: MembershipStore,
    pub participants: ParticipantStore,
    pub commitments: CommitmentStore,
    pub needs_offers: NeedOfferStore,
    pub edges: EdgeStore,
}

/// Deep value copy of every collection, sufficient to restore the exact
/// pre-merge state. All fields are owned data, so `Clone` is a deep clone;
/// no nested collection shares references with the live store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    contacts: ContactStore,
    memberships: MembershipStore,
    participants: ParticipantStore,
    commitments: CommitmentStore,
    needs_offers: NeedOfferStore,
    edges: EdgeStore,
}

impl RelateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            contacts: self.contacts.clone(),
            memberships: self.memberships.clone(),
            participants: self.participants.clone(),
            commitments: self.commitments.clone(),
            needs_offers: self.needs_offers.clone(),
            edges: self.edges.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.contacts = snapshot.contacts;
        self.memberships = snapshot.memberships;
        self.participants = snapshot.participants;
        self.commitments = snapshot.commitments;
        self.needs_offers = snapshot.needs_offers;
        self.edges = snapshot.edges;
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
        self.memberships.clear();
        self.participants.clear();
        self.commitments.clear();
        self.needs_offers.clear();
        self.edges.clear();
    }
}

/// Per-collaborator count of references rewritten for one (from, to) pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReassignmentReport {
    pub memberships: usize,
    pub participants: usize,
    pub commitment_parties: usize,
    pub needs_offers: usize,
    pub edges: usize,
}

impl ReassignmentReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.memberships
            + self.participants
            + self.commitment_parties
            + self.needs_offers
            + self.edges
    }
}

/// Move every reference from `from` to `to` across all collaborator
/// collections in the workspace. Idempotent. Any collaborator failure is
/// returned as-is; the merge controller treats it as a rollback trigger no
/// matter how many collaborators were already rewritten.
///
/// # Errors
/// Propagates the first [`StoreError`] a collaborator reports.
pub fn reassign_references(
    store: &mut RelateStore,
    workspace_id: WorkspaceId,
    from: ContactId,
    to: ContactId,
) -> Result<ReassignmentReport, StoreError> {
    let memberships = store.memberships.reassign(workspace_id, from, to)?;
    let participants = store.participants.reassign(workspace_id, from, to)?;
    let commitment_parties = store.commitments.reassign(workspace_id, from, to)?;
    let needs_offers = store.needs_offers.reassign(workspace_id, from, to);
    let edges = store.edges.reassign(workspace_id, from, to);
    Ok(ReassignmentReport { memberships, participants, commitment_parties, needs_offers, edges })
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MergeRequest {
    pub workspace_id: WorkspaceId,
    pub survivor_id: ContactId,
    pub source_ids: Vec<ContactId>,
    pub selection: Option<MergeSelection>,
}

/// Merge source contacts into the survivor: snapshot, resolve, commit,
/// reassign, verify — all-or-nothing.
///
/// The sequence runs uninterrupted: validation happens before any mutation,
/// a full deep snapshot is captured, the merged record replaces the survivor
/// and every source is deleted, each source id is repointed across all
/// collaborators, and finally the survivor's continued existence is checked.
/// Any failure after the snapshot restores every collection exactly, so the
/// caller observes either the committed merged contact or the untouched
/// pre-merge state.
///
/// # Errors
/// - [`MergeError::Validation`] — unknown survivor/source id, empty
///   effective source list, or a selection naming a record outside scope;
///   raised before any mutation.
/// - [`MergeError::Commit`], [`MergeError::Reassignment`],
///   [`MergeError::SurvivorMissing`] — raised after the snapshot and fully
///   rolled back.
pub fn merge_contacts(
    store: &mut RelateStore,
    request: &MergeRequest,
) -> Result<Contact, MergeError> {
    let workspace_id = request.workspace_id;
    let survivor = store
        .contacts
        .get(workspace_id, request.survivor_id)
        .cloned()
        .ok_or_else(|| {
            KernelError::Validation(format!(
                "survivor {} not found in workspace {workspace_id}",
                request.survivor_id
            ))
        })?;

    let mut effective_sources: Vec<ContactId> = Vec::new();
    for source_id in &request.source_ids {
        if *source_id != survivor.id && !effective_sources.contains(source_id) {
            effective_sources.push(*source_id);
        }
    }
    if effective_sources.is_empty() {
        return Err(KernelError::Validation(
            "effective source list is empty after removing the survivor id".to_string(),
        )
        .into());
    }

    let mut sources = Vec::with_capacity(effective_sources.len());
    for source_id in &effective_sources {
        let source = store.contacts.get(workspace_id, *source_id).cloned().ok_or_else(|| {
            KernelError::Validation(format!(
                "source {source_id} not found in workspace {workspace_id}"
            ))
        })?;
        sources.push(source);
    }

    // Pure resolution up front: an out-of-scope selection fails before any
    // mutation, and the merged record must honor contact invariants.
    let mut merged = resolve_merged_contact(&survivor, &sources, request.selection.as_ref())?;
    merged.validate().map_err(MergeError::Validation)?;
    merged.updated_at = OffsetDateTime::now_utc();

    let snapshot = store.snapshot();
    match commit_and_reassign(store, workspace_id, merged, &effective_sources) {
        Ok(committed) => Ok(committed),
        Err(err) => {
            store.restore(snapshot);
            Err(err)
        }
    }
}

fn commit_and_reassign(
    store: &mut RelateStore,
    workspace_id: WorkspaceId,
    merged: Contact,
    source_ids: &[ContactId],
) -> Result<Contact, MergeError> {
    let survivor_id = merged.id;
    store.contacts.put(merged.clone()).map_err(MergeError::Commit)?;
    for source_id in source_ids {
        store.contacts.delete(workspace_id, *source_id);
    }

    for source_id in source_ids {
        reassign_references(store, workspace_id, *source_id, survivor_id)
            .map_err(MergeError::Reassignment)?;
    }

    // The survivor must still resolve after every source is repointed.
    if store.contacts.get(workspace_id, survivor_id).is_none() {
        return Err(MergeError::SurvivorMissing(survivor_id));
    }

    Ok(merged)
}
