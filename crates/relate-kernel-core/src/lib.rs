use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

/// Trigram similarity at or above this value counts as a fuzzy name match.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.45;

const EXACT_CHANNEL_WEIGHT: f64 = 0.8;
const NAME_SIMILARITY_WEIGHT: f64 = 0.6;
const CONTEXT_SIGNAL_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WorkspaceId(pub Ulid);

impl WorkspaceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WorkspaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ContactId(pub Ulid);

impl ContactId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ContactId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ContactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Phone,
    Email,
    Telegram,
    Whatsapp,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Telegram => "telegram",
            Self::Whatsapp => "whatsapp",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "phone" => Some(Self::Phone),
            "email" => Some(Self::Email),
            "telegram" => Some(Self::Telegram),
            "whatsapp" => Some(Self::Whatsapp),
            _ => None,
        }
    }
}

/// One contact method owned by exactly one contact. Channel identity for
/// merge purposes is the (kind, trim-lowercased value) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub kind: ChannelKind,
    pub value: String,
    pub is_primary: bool,
}

impl Channel {
    #[must_use]
    pub fn new(kind: ChannelKind, value: impl Into<String>, is_primary: bool) -> Self {
        Self { kind, value: value.into(), is_primary }
    }

    #[must_use]
    pub fn union_key(&self) -> (ChannelKind, String) {
        (self.kind, normalized(&self.value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Identity record for one real-world person within a workspace.
///
/// `id` and `workspace_id` are immutable after creation. The collection
/// attributes (`aliases`, `tags`, `organizations`, `communities`) behave as
/// sets under case-insensitive trim-normalized comparison while preserving
/// first-seen casing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: ContactId,
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
    pub notes: Vec<Note>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Contact {
    /// Validate one contact record against domain invariants.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] when the name is blank, the trust
    /// score is not finite, a collection attribute repeats under
    /// case-insensitive comparison, a channel value is blank, or more than
    /// one channel carries the primary flag.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.name.trim().is_empty() {
            return Err(KernelError::Validation("name MUST be non-empty".to_string()));
        }

        if let Some(trust_score) = self.trust_score {
            if !trust_score.is_finite() {
                return Err(KernelError::Validation("trust_score MUST be finite".to_string()));
            }
        }

        for (field, values) in [
            ("aliases", &self.aliases),
            ("tags", &self.tags),
            ("organizations", &self.organizations),
            ("communities", &self.communities),
        ] {
            let mut seen = BTreeSet::new();
            for value in values {
                if !seen.insert(normalized(value)) {
                    return Err(KernelError::Validation(format!(
                        "{field} MUST NOT repeat entries case-insensitively: {value}"
                    )));
                }
            }
        }

        let mut primaries = 0_usize;
        for channel in &self.channels {
            if channel.value.trim().is_empty() {
                return Err(KernelError::Validation("channel value MUST be non-empty".to_string()));
            }
            if channel.is_primary {
                primaries += 1;
            }
        }
        if primaries > 1 {
            return Err(KernelError::Validation(
                "at most one channel may carry the primary flag".to_string(),
            ));
        }

        Ok(())
    }
}

/// Trim-lowercased form used for every case-insensitive comparison.
#[must_use]
pub fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

fn trigrams(value: &str) -> BTreeSet<String> {
    let padded: Vec<char> = format!("  {value}  ").chars().collect();
    padded.windows(3).map(|window| window.iter().collect()).collect()
}

/// Dice coefficient over 3-character substrings of the space-padded inputs.
/// Returns 0.0 when either side is empty.
#[must_use]
pub fn trigram_similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let left_set = trigrams(left);
    let right_set = trigrams(right);
    let intersection = left_set.intersection(&right_set).count();
    let denominator = left_set.len() + right_set.len();
    if denominator == 0 {
        return 0.0;
    }
    (2 * intersection) as f64 / denominator as f64
}

/// Duplicate-likelihood outcome for one contact pair: a score in [0, 1] and
/// the ordered list of signals that fired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityScore {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Ephemeral ranked candidate pair. Never persisted; recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupeSuggestion {
    pub contact_id: ContactId,
    pub candidate_id: ContactId,
    pub score: f64,
    pub reasons: Vec<String>,
}

fn channel_values(contact: &Contact, kind: ChannelKind) -> BTreeSet<String> {
    contact
        .channels
        .iter()
        .filter(|channel| channel.kind == kind)
        .map(|channel| normalized(&channel.value))
        .filter(|value| !value.is_empty())
        .collect()
}

fn normalized_set(values: &[String]) -> BTreeSet<String> {
    values.iter().map(|value| normalized(value)).filter(|value| !value.is_empty()).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score one unordered contact pair.
///
/// Returns `None` unless at least one reason fired; a bare numeric score is
/// never sufficient to suggest a pair. Deterministic: identical inputs always
/// produce identical scores and reasons.
#[must_use]
pub fn score_pair(left: &Contact, right: &Contact) -> Option<SimilarityScore> {
    let mut reasons = Vec::new();
    let mut score = 0.0_f64;

    if !channel_values(left, ChannelKind::Email).is_disjoint(&channel_values(
        right,
        ChannelKind::Email,
    )) {
        reasons.push("Exact email match".to_string());
        score += EXACT_CHANNEL_WEIGHT;
    }

    if !channel_values(left, ChannelKind::Phone).is_disjoint(&channel_values(
        right,
        ChannelKind::Phone,
    )) {
        reasons.push("Exact phone match".to_string());
        score += EXACT_CHANNEL_WEIGHT;
    }

    let name_similarity = trigram_similarity(&normalized(&left.name), &normalized(&right.name));
    if name_similarity >= NAME_SIMILARITY_THRESHOLD {
        reasons.push("Fuzzy name match".to_string());
        score += name_similarity * NAME_SIMILARITY_WEIGHT;

        let left_city = left.city.as_deref().map(normalized).unwrap_or_default();
        let right_city = right.city.as_deref().map(normalized).unwrap_or_default();
        if !left_city.is_empty() && left_city == right_city {
            reasons.push("Same city".to_string());
            score += CONTEXT_SIGNAL_WEIGHT;
        }

        if !normalized_set(&left.organizations).is_disjoint(&normalized_set(&right.organizations)) {
            reasons.push("Shared organization".to_string());
            score += CONTEXT_SIGNAL_WEIGHT;
        }
    }

    if reasons.is_empty() {
        return None;
    }

    Some(SimilarityScore { score: round2(score.min(1.0)), reasons })
}

/// Apply the scorer over every unordered pair of the given contacts.
///
/// Results are sorted descending by score; equal scores keep first-seen pair
/// enumeration order (stable sort), so the ranking is deterministic for a
/// given input order. Read-only and safe to call repeatedly.
#[must_use]
pub fn suggest_duplicates(contacts: &[Contact]) -> Vec<DedupeSuggestion> {
    let mut suggestions = Vec::new();
    for (index, left) in contacts.iter().enumerate() {
        for right in &contacts[index + 1..] {
            if let Some(outcome) = score_pair(left, right) {
                suggestions.push(DedupeSuggestion {
                    contact_id: left.id,
                    candidate_id: right.id,
                    score: outcome.score,
                    reasons: outcome.reasons,
                });
            }
        }
    }
    suggestions.sort_by(|lhs, rhs| {
        rhs.score.partial_cmp(&lhs.score).unwrap_or(std::cmp::Ordering::Equal)
    });
    suggestions
}

/// Per-field "use this record's value" choices for one merge call. Each entry
/// names the record (survivor or source) whose value wins for that scalar
/// field; unset fields default to the survivor's current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct MergeSelection {
    pub name: Option<ContactId>,
    pub city: Option<ContactId>,
    pub tier: Option<ContactId>,
    pub trust_score: Option<ContactId>,
    pub introduced_by: Option<ContactId>,
}

impl MergeSelection {
    fn entries(&self) -> [(&'static str, Option<ContactId>); 5] {
        [
            ("name", self.name),
            ("city", self.city),
            ("tier", self.tier),
            ("trust_score", self.trust_score),
            ("introduced_by", self.introduced_by),
        ]
    }

    /// Reject any selection entry naming a record outside the merge scope.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] naming the offending field.
    pub fn validate_scope(&self, allowed: &BTreeSet<ContactId>) -> Result<(), KernelError> {
        for (field, choice) in self.entries() {
            if let Some(id) = choice {
                if !allowed.contains(&id) {
                    return Err(KernelError::Validation(format!(
                        "selection for `{field}` references contact {id} outside the merge scope"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn union_case_insensitive<'a>(groups: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut union = Vec::new();
    for group in groups {
        for value in group {
            if seen.insert(normalized(value)) {
                union.push(value.clone());
            }
        }
    }
    union
}

fn union_channels<'a>(contributors: impl Iterator<Item = &'a Contact>) -> Vec<Channel> {
    let mut union: Vec<Channel> = Vec::new();
    for contact in contributors {
        for channel in &contact.channels {
            let key = channel.union_key();
            if let Some(existing) = union.iter_mut().find(|entry| entry.union_key() == key) {
                existing.is_primary = existing.is_primary || channel.is_primary;
            } else {
                union.push(channel.clone());
            }
        }
    }

    // Post-merge invariant: exactly one primary among non-empty channels.
    let mut primary_seen = false;
    for channel in &mut union {
        if channel.is_primary {
            if primary_seen {
                channel.is_primary = false;
            }
            primary_seen = true;
        }
    }
    if !primary_seen {
        if let Some(first) = union.first_mut() {
            first.is_primary = true;
        }
    }
    union
}

/// Build the merged contact value for one survivor and its sources.
///
/// Pure: commits nothing and mutates nothing. Scalar fields follow the
/// selection (defaulting to the survivor), collection fields union
/// case-insensitively survivor-first, channels union by (kind, normalized
/// value) with the primary flag OR-ed, and notes concatenate without
/// de-duplication. The survivor's id, workspace, and timestamps carry over
/// unchanged; the committing store refreshes `updated_at`.
///
/// # Errors
/// Returns [`KernelError::Validation`] when the selection references a record
/// outside the survivor-plus-sources scope.
pub fn resolve_merged_contact(
    survivor: &Contact,
    sources: &[Contact],
    selection: Option<&MergeSelection>,
) -> Result<Contact, KernelError> {
    let allowed: BTreeSet<ContactId> =
        std::iter::once(survivor.id).chain(sources.iter().map(|source| source.id)).collect();
    if let Some(selection) = selection {
        selection.validate_scope(&allowed)?;
    }

    let participant = |choice: Option<ContactId>| -> &Contact {
        choice
            .and_then(|id| {
                std::iter::once(survivor)
                    .chain(sources.iter())
                    .find(|contact| contact.id == id)
            })
            .unwrap_or(survivor)
    };
    let selection = selection.cloned().unwrap_or_default();

    let mut notes = survivor.notes.clone();
    for source in sources {
        notes.extend(source.notes.iter().cloned());
    }

    let merged = Contact {
        id: survivor.id,
        workspace_id: survivor.workspace_id,
        name: participant(selection.name).name.clone(),
        city: participant(selection.city).city.clone(),
        tier: participant(selection.tier).tier.clone(),
        trust_score: participant(selection.trust_score).trust_score,
        introduced_by: participant(selection.introduced_by).introduced_by.clone(),
        aliases: union_case_insensitive(
            std::iter::once(survivor.aliases.as_slice())
                .chain(sources.iter().map(|source| source.aliases.as_slice())),
        ),
        tags: union_case_insensitive(
            std::iter::once(survivor.tags.as_slice())
                .chain(sources.iter().map(|source| source.tags.as_slice())),
        ),
        organizations: union_case_insensitive(
            std::iter::once(survivor.organizations.as_slice())
                .chain(sources.iter().map(|source| source.organizations.as_slice())),
        ),
        communities: union_case_insensitive(
            std::iter::once(survivor.communities.as_slice())
                .chain(sources.iter().map(|source| source.communities.as_slice())),
        ),
        channels: union_channels(std::iter::once(survivor).chain(sources.iter())),
        notes,
        created_at: survivor.created_at,
        updated_at: survivor.updated_at,
    };

    Ok(merged)
}
