use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn unique_state_path(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{prefix}-{}.json", ulid::Ulid::new()))
}

/// Run `rk` against the given state file. The `--state` flag is prepended so
/// call sites list only the subcommand and its arguments.
fn run_rk(state: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rk"))
        .arg("--state")
        .arg(state)
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute rk binary: {err}"))
}

fn run_json(state: &Path, args: &[&str]) -> Value {
    let output = run_rk(state, args);
    if !output.status.success() {
        panic!(
            "rk {} failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, key: &str) -> &'a Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array field `{key}` in payload: {value}"))
}

fn new_workspace(state: &Path) -> String {
    let created = run_json(state, &["workspace", "new"]);
    as_str(&created, "workspace_id").to_string()
}

#[test]
fn contact_add_list_and_dedupe_scan_flow_is_consistent() {
    let state = unique_state_path("relatekernel-cli-dedupe");
    let workspace = new_workspace(&state);

    let alpha = run_json(
        &state,
        &[
            "contact",
            "add",
            "--workspace",
            &workspace,
            "--name",
            "Alpha Ivanova",
            "--city",
            "Lisbon",
            "--organization",
            "Orbit Labs",
            "--channel",
            "email:alpha@example.com:primary",
            "--channel",
            "phone:+351900000001",
        ],
    );
    assert_eq!(as_str(&alpha, "contract_version"), "cli.v1");
    assert_eq!(as_str(&alpha, "name"), "Alpha Ivanova");
    let alpha_id = as_str(&alpha, "id").to_string();

    let alfa = run_json(
        &state,
        &[
            "contact",
            "add",
            "--workspace",
            &workspace,
            "--name",
            "Alfa Ivanova",
            "--city",
            "Lisbon",
            "--organization",
            "Orbit Labs",
            "--channel",
            "email:alpha@example.com",
        ],
    );
    let alfa_id = as_str(&alfa, "id").to_string();

    let listed = run_json(&state, &["contact", "list", "--workspace", &workspace]);
    assert_eq!(as_i64(&listed, "total"), 2);

    let scan = run_json(&state, &["dedupe", "scan", "--workspace", &workspace]);
    assert_eq!(as_str(&scan, "contract_version"), "cli.v1");
    let suggestions = as_array(&scan, "suggestions");
    assert_eq!(suggestions.len(), 1);
    let suggestion = &suggestions[0];
    assert_eq!(as_str(suggestion, "contact_id"), alpha_id);
    assert_eq!(as_str(suggestion, "candidate_id"), alfa_id);
    let reasons: Vec<&str> =
        as_array(suggestion, "reasons").iter().filter_map(Value::as_str).collect();
    assert!(reasons.contains(&"Exact email match"), "unexpected reasons: {reasons:?}");
    assert!(reasons.contains(&"Fuzzy name match"), "unexpected reasons: {reasons:?}");

    let shown =
        run_json(&state, &["contact", "show", "--workspace", &workspace, "--id", &alpha_id]);
    assert_eq!(as_str(&shown, "id"), alpha_id);

    let _ = fs::remove_file(&state);
}

#[test]
fn merge_run_repoints_relations_and_removes_the_source() {
    let state = unique_state_path("relatekernel-cli-merge");
    let workspace = new_workspace(&state);

    let survivor = run_json(
        &state,
        &[
            "contact",
            "add",
            "--workspace",
            &workspace,
            "--name",
            "Alpha Ivanova",
            "--channel",
            "email:alpha@example.com:primary",
        ],
    );
    let survivor_id = as_str(&survivor, "id").to_string();

    let source = run_json(
        &state,
        &[
            "contact",
            "add",
            "--workspace",
            &workspace,
            "--name",
            "Alfa Ivanova",
            "--city",
            "Lisbon",
            "--channel",
            "phone:+351900000001:primary",
            "--note",
            "met at the harbor meetup",
        ],
    );
    let source_id = as_str(&source, "id").to_string();

    let _membership = run_json(
        &state,
        &[
            "relation",
            "add-membership",
            "--workspace",
            &workspace,
            "--community",
            "community-1",
            "--contact",
            &source_id,
        ],
    );
    let _participant = run_json(
        &state,
        &[
            "relation",
            "add-participant",
            "--workspace",
            &workspace,
            "--interaction",
            "interaction-1",
            "--contact",
            &source_id,
        ],
    );
    let owed_by = format!("{source_id}:owed_by");
    let owes_to = format!("{survivor_id}:owes_to");
    let _commitment = run_json(
        &state,
        &[
            "relation",
            "add-commitment",
            "--workspace",
            &workspace,
            "--title",
            "send the intro deck",
            "--party",
            &owed_by,
            "--party",
            &owes_to,
        ],
    );
    let _need = run_json(
        &state,
        &[
            "relation",
            "add-need-offer",
            "--workspace",
            &workspace,
            "--contact",
            &source_id,
            "--kind",
            "need",
        ],
    );
    let _edge = run_json(
        &state,
        &[
            "relation",
            "add-edge",
            "--workspace",
            &workspace,
            "--from",
            &source_id,
            "--to",
            &survivor_id,
            "--introduced-by",
            &source_id,
        ],
    );

    let city_selection = format!("city={source_id}");
    let merged = run_json(
        &state,
        &[
            "merge",
            "run",
            "--workspace",
            &workspace,
            "--survivor",
            &survivor_id,
            "--source",
            &source_id,
            "--select",
            &city_selection,
        ],
    );
    assert_eq!(as_str(&merged, "survivor_id"), survivor_id);
    assert_eq!(as_i64(&merged, "source_count"), 1);
    let merged_contact = merged
        .get("merged_contact")
        .unwrap_or_else(|| panic!("merge output should include merged_contact: {merged}"));
    assert_eq!(as_str(merged_contact, "id"), survivor_id);
    assert_eq!(as_str(merged_contact, "city"), "Lisbon");
    assert_eq!(as_array(merged_contact, "channels").len(), 2);
    assert_eq!(as_array(merged_contact, "notes").len(), 1);

    let listed = run_json(&state, &["contact", "list", "--workspace", &workspace]);
    assert_eq!(as_i64(&listed, "total"), 1);

    let relations = run_json(&state, &["relation", "list", "--workspace", &workspace]);
    for collection in ["memberships", "participants", "needs_offers"] {
        let records = as_array(&relations, collection);
        assert_eq!(records.len(), 1, "unexpected {collection}: {records:?}");
        assert_eq!(as_str(&records[0], "contact_id"), survivor_id);
    }
    let parties = as_array(&relations, "commitment_parties");
    assert_eq!(parties.len(), 2);
    for party in parties {
        assert_eq!(as_str(party, "contact_id"), survivor_id);
    }
    let edges = as_array(&relations, "edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(as_str(&edges[0], "from_contact_id"), survivor_id);
    assert_eq!(as_str(&edges[0], "to_contact_id"), survivor_id);
    assert_eq!(as_str(&edges[0], "introduced_by_contact_id"), survivor_id);

    let _ = fs::remove_file(&state);
}

#[test]
fn failed_merge_leaves_the_state_file_byte_identical() {
    let state = unique_state_path("relatekernel-cli-merge-failure");
    let workspace = new_workspace(&state);

    let survivor = run_json(
        &state,
        &["contact", "add", "--workspace", &workspace, "--name", "Alpha Ivanova"],
    );
    let survivor_id = as_str(&survivor, "id").to_string();
    let missing_source_id = ulid::Ulid::new().to_string();

    let before = fs::read(&state)
        .unwrap_or_else(|err| panic!("failed to read state file {}: {err}", state.display()));

    let output = run_rk(
        &state,
        &[
            "merge",
            "run",
            "--workspace",
            &workspace,
            "--survivor",
            &survivor_id,
            "--source",
            &missing_source_id,
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found in workspace"), "unexpected stderr: {stderr}");

    let after = fs::read(&state)
        .unwrap_or_else(|err| panic!("failed to read state file {}: {err}", state.display()));
    assert_eq!(before, after);

    let _ = fs::remove_file(&state);
}

#[test]
fn contact_show_rejects_non_ulid_ids() {
    let state = unique_state_path("relatekernel-cli-id-validation");
    let workspace = new_workspace(&state);

    let output = run_rk(
        &state,
        &["contact", "show", "--workspace", &workspace, "--id", "not-a-ulid"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid contact id"), "unexpected stderr: {stderr}");

    let _ = fs::remove_file(&state);
}

#[test]
fn state_reset_replaces_previous_contents() {
    let state = unique_state_path("relatekernel-cli-reset");
    let workspace = new_workspace(&state);

    let _contact = run_json(
        &state,
        &["contact", "add", "--workspace", &workspace, "--name", "Alpha Ivanova"],
    );
    let reset = run_json(&state, &["state", "reset"]);
    assert_eq!(as_str(&reset, "status"), "reset");

    let listed = run_json(&state, &["contact", "list", "--workspace", &workspace]);
    assert_eq!(as_i64(&listed, "total"), 0);

    let _ = fs::remove_file(&state);
}
