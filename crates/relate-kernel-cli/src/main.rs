use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use relate_kernel_api::{AddContactRequest, PartyInput, RelateApi};
use relate_kernel_core::{Channel, ChannelKind, ContactId, MergeSelection, WorkspaceId};
use relate_kernel_store_memory::{
    CommitmentStatus, MergeRequest, NeedOfferKind, NeedOfferStatus, PartyRole,
};
use serde_json::Value;
use ulid::Ulid;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "rk")]
#[command(about = "Relate Kernel CLI")]
struct Cli {
    #[arg(long, default_value = "./relate_kernel.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommand,
    },
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
    Contact {
        #[command(subcommand)]
        command: ContactCommand,
    },
    Relation {
        #[command(subcommand)]
        command: RelationCommand,
    },
    Dedupe {
        #[command(subcommand)]
        command: DedupeCommand,
    },
    Merge {
        #[command(subcommand)]
        command: MergeCommand,
    },
}

#[derive(Debug, Subcommand)]
enum WorkspaceCommand {
    New,
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    Reset,
}

#[derive(Debug, Subcommand)]
enum ContactCommand {
    Add(Box<ContactAddArgs>),
    List(WorkspaceArgs),
    Show(ContactShowArgs),
}

#[derive(Debug, Args)]
struct WorkspaceArgs {
    #[arg(long)]
    workspace: String,
}

#[derive(Debug, Args)]
struct ContactAddArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    tier: Option<String>,
    #[arg(long)]
    trust_score: Option<f64>,
    #[arg(long)]
    introduced_by: Option<String>,
    #[arg(long = "alias")]
    aliases: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long = "organization")]
    organizations: Vec<String>,
    #[arg(long = "community")]
    communities: Vec<String>,
    /// Channel spec: `kind:value` or `kind:value:primary`.
    #[arg(long = "channel")]
    channels: Vec<String>,
    #[arg(long = "note")]
    notes: Vec<String>,
}

#[derive(Debug, Args)]
struct ContactShowArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum RelationCommand {
    AddMembership(AddMembershipArgs),
    AddParticipant(AddParticipantArgs),
    AddCommitment(AddCommitmentArgs),
    AddNeedOffer(AddNeedOfferArgs),
    AddEdge(AddEdgeArgs),
    List(WorkspaceArgs),
}

#[derive(Debug, Args)]
struct AddMembershipArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    community: String,
    #[arg(long)]
    contact: String,
    #[arg(long)]
    role: Option<String>,
}

#[derive(Debug, Args)]
struct AddParticipantArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    interaction: String,
    #[arg(long)]
    contact: String,
    #[arg(long)]
    role: Option<String>,
}

#[derive(Debug, Args)]
struct AddCommitmentArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "open")]
    status: String,
    /// Party spec: `contact_id:role` with role one of owed_by, owes_to,
    /// observer.
    #[arg(long = "party")]
    parties: Vec<String>,
}

#[derive(Debug, Args)]
struct AddNeedOfferArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    contact: String,
    #[arg(long)]
    kind: String,
    #[arg(long, default_value = "open")]
    status: String,
}

#[derive(Debug, Args)]
struct AddEdgeArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
    #[arg(long)]
    introduced_by: Option<String>,
}

#[derive(Debug, Subcommand)]
enum DedupeCommand {
    Scan(WorkspaceArgs),
}

#[derive(Debug, Subcommand)]
enum MergeCommand {
    Run(MergeRunArgs),
}

#[derive(Debug, Args)]
struct MergeRunArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    survivor: String,
    #[arg(long = "source", required = true)]
    sources: Vec<String>,
    /// Selection spec: `field=contact_id` with field one of name, city,
    /// tier, trust_score, introduced_by.
    #[arg(long = "select")]
    selections: Vec<String>,
}

fn parse_workspace_id(value: &str) -> Result<WorkspaceId> {
    Ulid::from_string(value)
        .map(WorkspaceId)
        .map_err(|err| anyhow!("invalid workspace id `{value}`: {err}"))
}

fn parse_contact_id(value: &str) -> Result<ContactId> {
    Ulid::from_string(value)
        .map(ContactId)
        .map_err(|err| anyhow!("invalid contact id `{value}`: {err}"))
}

fn parse_channel(spec: &str) -> Result<Channel> {
    let mut parts = spec.splitn(3, ':');
    let kind_part = parts.next().unwrap_or_default();
    let value = parts
        .next()
        .ok_or_else(|| anyhow!("channel `{spec}` must look like kind:value[:primary]"))?;
    let kind = ChannelKind::parse(kind_part)
        .ok_or_else(|| anyhow!("unknown channel kind `{kind_part}`"))?;
    let is_primary = match parts.next() {
        None => false,
        Some("primary") => true,
        Some(other) => return Err(anyhow!("unknown channel flag `{other}`")),
    };
    Ok(Channel::new(kind, value, is_primary))
}

fn parse_party(spec: &str) -> Result<PartyInput> {
    let (contact_part, role_part) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("party `{spec}` must look like contact_id:role"))?;
    let role =
        PartyRole::parse(role_part).ok_or_else(|| anyhow!("unknown party role `{role_part}`"))?;
    Ok(PartyInput { contact_id: parse_contact_id(contact_part)?, role })
}

fn parse_selection(specs: &[String]) -> Result<Option<MergeSelection>> {
    if specs.is_empty() {
        return Ok(None);
    }
    let mut selection = MergeSelection::default();
    for spec in specs {
        let (field, id_part) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("selection `{spec}` must look like field=contact_id"))?;
        let id = parse_contact_id(id_part)?;
        match field {
            "name" => selection.name = Some(id),
            "city" => selection.city = Some(id),
            "tier" => selection.tier = Some(id),
            "trust_score" => selection.trust_score = Some(id),
            "introduced_by" => selection.introduced_by = Some(id),
            other => return Err(anyhow!("unknown selection field `{other}`")),
        }
    }
    Ok(Some(selection))
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = RelateApi::new(cli.state);
    match cli.command {
        Command::Workspace { command } => run_workspace(&command),
        Command::State { command } => run_state(&command, &api),
        Command::Contact { command } => run_contact(command, &api),
        Command::Relation { command } => run_relation(command, &api),
        Command::Dedupe { command } => run_dedupe(&command, &api),
        Command::Merge { command } => run_merge(&command, &api),
    }
}

fn run_workspace(command: &WorkspaceCommand) -> Result<()> {
    match command {
        WorkspaceCommand::New => emit_json(serde_json::json!({
            "workspace_id": WorkspaceId::new()
        })),
    }
}

fn run_state(command: &StateCommand, api: &RelateApi) -> Result<()> {
    match command {
        StateCommand::Reset => {
            api.reset()?;
            emit_json(serde_json::json!({ "status": "reset" }))
        }
    }
}

fn run_contact(command: ContactCommand, api: &RelateApi) -> Result<()> {
    match command {
        ContactCommand::Add(args) => run_contact_add(*args, api),
        ContactCommand::List(args) => {
            let workspace_id = parse_workspace_id(&args.workspace)?;
            let contacts = api.list_contacts(workspace_id)?;
            emit_json(serde_json::json!({
                "workspace_id": workspace_id,
                "total": contacts.len(),
                "contacts": contacts
            }))
        }
        ContactCommand::Show(args) => {
            let workspace_id = parse_workspace_id(&args.workspace)?;
            let contact = api.get_contact(workspace_id, parse_contact_id(&args.id)?)?;
            emit_json(serde_json::to_value(contact)?)
        }
    }
}

fn run_contact_add(args: ContactAddArgs, api: &RelateApi) -> Result<()> {
    let channels =
        args.channels.iter().map(|spec| parse_channel(spec)).collect::<Result<Vec<_>>>()?;
    let contact = api.add_contact(AddContactRequest {
        workspace_id: parse_workspace_id(&args.workspace)?,
        name: args.name,
        city: args.city,
        tier: args.tier,
        trust_score: args.trust_score,
        introduced_by: args.introduced_by,
        aliases: args.aliases,
        tags: args.tags,
        organizations: args.organizations,
        communities: args.communities,
        channels,
        notes: args.notes,
    })?;
    emit_json(serde_json::to_value(contact)?)
}

fn run_relation(command: RelationCommand, api: &RelateApi) -> Result<()> {
    match command {
        RelationCommand::AddMembership(args) => {
            let membership = api.add_membership(
                parse_workspace_id(&args.workspace)?,
                &args.community,
                parse_contact_id(&args.contact)?,
                args.role,
            )?;
            emit_json(serde_json::to_value(membership)?)
        }
        RelationCommand::AddParticipant(args) => {
            let participant = api.add_participant(
                parse_workspace_id(&args.workspace)?,
                &args.interaction,
                parse_contact_id(&args.contact)?,
                args.role,
            )?;
            emit_json(serde_json::to_value(participant)?)
        }
        RelationCommand::AddCommitment(args) => {
            let status = CommitmentStatus::parse(&args.status)
                .ok_or_else(|| anyhow!("unknown commitment status `{}`", args.status))?;
            let parties =
                args.parties.iter().map(|spec| parse_party(spec)).collect::<Result<Vec<_>>>()?;
            let commitment = api.add_commitment(
                parse_workspace_id(&args.workspace)?,
                &args.title,
                status,
                &parties,
            )?;
            emit_json(serde_json::to_value(commitment)?)
        }
        RelationCommand::AddNeedOffer(args) => {
            let kind = match args.kind.as_str() {
                "need" => NeedOfferKind::Need,
                "offer" => NeedOfferKind::Offer,
                other => return Err(anyhow!("unknown need/offer kind `{other}`")),
            };
            let status = match args.status.as_str() {
                "open" => NeedOfferStatus::Open,
                "matched" => NeedOfferStatus::Matched,
                "closed" => NeedOfferStatus::Closed,
                other => return Err(anyhow!("unknown need/offer status `{other}`")),
            };
            let record = api.add_need_offer(
                parse_workspace_id(&args.workspace)?,
                parse_contact_id(&args.contact)?,
                kind,
                status,
            )?;
            emit_json(serde_json::to_value(record)?)
        }
        RelationCommand::AddEdge(args) => {
            let introduced_by =
                args.introduced_by.as_deref().map(parse_contact_id).transpose()?;
            let edge = api.add_edge(
                parse_workspace_id(&args.workspace)?,
                parse_contact_id(&args.from)?,
                parse_contact_id(&args.to)?,
                introduced_by,
            )?;
            emit_json(serde_json::to_value(edge)?)
        }
        RelationCommand::List(args) => {
            let workspace_id = parse_workspace_id(&args.workspace)?;
            let relations = api.relations(workspace_id)?;
            emit_json(serde_json::to_value(relations)?)
        }
    }
}

fn run_dedupe(command: &DedupeCommand, api: &RelateApi) -> Result<()> {
    match command {
        DedupeCommand::Scan(args) => {
            let workspace_id = parse_workspace_id(&args.workspace)?;
            let suggestions = api.scan_duplicates(workspace_id)?;
            emit_json(serde_json::json!({
                "workspace_id": workspace_id,
                "total": suggestions.len(),
                "suggestions": suggestions
            }))
        }
    }
}

fn run_merge(command: &MergeCommand, api: &RelateApi) -> Result<()> {
    match command {
        MergeCommand::Run(args) => {
            let workspace_id = parse_workspace_id(&args.workspace)?;
            let survivor_id = parse_contact_id(&args.survivor)?;
            let source_ids = args
                .sources
                .iter()
                .map(|source| parse_contact_id(source))
                .collect::<Result<Vec<_>>>()?;
            let selection = parse_selection(&args.selections)?;
            let merged = api.merge(&MergeRequest {
                workspace_id,
                survivor_id,
                source_ids: source_ids.clone(),
                selection,
            })?;
            emit_json(serde_json::json!({
                "survivor_id": survivor_id,
                "source_count": source_ids.len(),
                "merged_contact": merged
            }))
        }
    }
}
