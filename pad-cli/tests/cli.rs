//! End-to-end command tests against the in-process relay network.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A driftpad invocation pinned to a temp data dir and the mock network.
fn driftpad(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("driftpad").expect("binary builds");
    cmd.arg("--data-dir")
        .arg(data_dir.path())
        .arg("--mock")
        .arg("--relay")
        .arg("wss://one.mock")
        .arg("--relay")
        .arg("wss://two.mock");
    cmd
}

/// Pull the pad id and secret key out of `create` output.
fn parse_create_output(stdout: &[u8]) -> (String, String) {
    let text = String::from_utf8_lossy(stdout);
    let value_after = |label: &str| -> String {
        text.lines()
            .find(|line| line.trim_start().starts_with(label))
            .and_then(|line| line.split_whitespace().last())
            .unwrap_or_else(|| panic!("no '{label}' line in output:\n{text}"))
            .to_string()
    };
    (value_after("Pad id:"), value_after("Secret key:"))
}

// ===== Session lifecycle =====

#[test]
fn create_prints_pad_id_and_secret() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir)
        .arg("create")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pad created"))
        .stdout(predicate::str::contains("Pad id:"))
        .stdout(predicate::str::contains("Secret key:"));
}

#[test]
fn create_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir).arg("create").assert().success();
    driftpad(&dir)
        .arg("create")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Already signed in"));
}

#[test]
fn status_reflects_the_session() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: NONE"));

    let output = driftpad(&dir).arg("create").output().unwrap();
    let (pad_id, _) = parse_create_output(&output.stdout);

    driftpad(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(&pad_id));
}

#[test]
fn logout_clears_the_session() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir).arg("create").assert().success();
    driftpad(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));
    driftpad(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: NONE"));
}

#[test]
fn data_dirs_isolate_sessions() {
    let here = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    driftpad(&here).arg("create").assert().success();
    driftpad(&elsewhere)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: NONE"));
}

// ===== Key transfer =====

#[test]
fn import_moves_the_key_between_devices() {
    let old_device = TempDir::new().unwrap();
    let new_device = TempDir::new().unwrap();

    let output = driftpad(&old_device).arg("create").output().unwrap();
    assert!(output.status.success());
    let (pad_id, secret) = parse_create_output(&output.stdout);

    driftpad(&new_device)
        .arg("import")
        .arg(&pad_id)
        .arg("--key")
        .arg(&secret)
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in to pad"))
        .stdout(predicate::str::contains("signed out"));
}

#[test]
fn import_rejects_a_mismatched_pad_id() {
    let pad_a = TempDir::new().unwrap();
    let pad_b = TempDir::new().unwrap();
    let device = TempDir::new().unwrap();

    let output_a = driftpad(&pad_a).arg("create").output().unwrap();
    let (_, secret_a) = parse_create_output(&output_a.stdout);
    let output_b = driftpad(&pad_b).arg("create").output().unwrap();
    let (pad_id_b, _) = parse_create_output(&output_b.stdout);

    driftpad(&device)
        .arg("import")
        .arg(&pad_id_b)
        .arg("--key")
        .arg(&secret_a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("identity mismatch"));
}

#[test]
fn import_rejects_a_malformed_key() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir)
        .arg("import")
        .arg("--key")
        .arg("not hex at all")
        .assert()
        .failure()
        .stderr(predicate::str::contains("hex"));
}

#[test]
fn imported_key_can_edit_the_pad() {
    let old_device = TempDir::new().unwrap();
    let new_device = TempDir::new().unwrap();

    let output = driftpad(&old_device).arg("create").output().unwrap();
    let (pad_id, secret) = parse_create_output(&output.stdout);

    driftpad(&new_device)
        .arg("import")
        .arg(&pad_id)
        .arg("--key")
        .arg(&secret)
        .assert()
        .success();

    driftpad(&new_device)
        .arg("edit")
        .arg(&pad_id)
        .write_stdin("hello from the new device\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("synced to 2/2"));
}

// ===== Sync pipeline =====

#[test]
fn edit_publishes_to_the_relays() {
    let dir = TempDir::new().unwrap();
    let output = driftpad(&dir).arg("create").output().unwrap();
    let (pad_id, _) = parse_create_output(&output.stdout);

    driftpad(&dir)
        .arg("edit")
        .arg(&pad_id)
        .write_stdin("hello pad\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("synced to 2/2"));
}

#[test]
fn edit_without_a_session_is_rejected() {
    let dir = TempDir::new().unwrap();
    let keyed = TempDir::new().unwrap();
    let output = driftpad(&keyed).arg("create").output().unwrap();
    let (pad_id, _) = parse_create_output(&output.stdout);

    driftpad(&dir)
        .arg("edit")
        .arg(&pad_id)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No session"));
}

#[test]
fn show_reports_an_empty_pad() {
    let dir = TempDir::new().unwrap();
    let keyed = TempDir::new().unwrap();
    let output = driftpad(&keyed).arg("create").output().unwrap();
    let (pad_id, _) = parse_create_output(&output.stdout);

    driftpad(&dir)
        .arg("show")
        .arg(&pad_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("(no content yet)"));
}

// ===== Argument validation =====

#[test]
fn malformed_pad_ids_are_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir)
        .arg("show")
        .arg("definitely-not-a-pad-id")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pad id"));
}

#[test]
fn help_names_every_command() {
    let dir = TempDir::new().unwrap();
    driftpad(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("edit"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("status"));
}
