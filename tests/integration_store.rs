use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MISSING_BUSCTL: &str = "/nonexistent/displayswitch-busctl";

fn write_store(path: &Path, names: &[&str]) {
    let configs = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                r#"["{name}",0,[[0,0,1.0,0,true,[["DP-{i}","1920x1080@60",{{}}]]]],{{}},[["DP-{i}","GSM","LG","000{i}"]]]"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    fs::write(
        path,
        format!(r#"{{"configs":[{configs}],"last_applied_index":1}}"#),
    )
    .expect("write store");
}

fn cmd(dir: &Path, store: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("displayswitch");
    cmd.args([
        "--config",
        dir.join("config.toml").to_str().unwrap(),
        "--store",
        store.to_str().unwrap(),
        "--busctl",
        MISSING_BUSCTL,
    ]);
    cmd
}

#[test]
fn list_with_empty_store_needs_no_display_service() {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("configs.json");

    cmd(dir.path(), &store)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Displayswitch: No saved configurations."));
}

#[test]
fn list_falls_back_to_names_when_display_service_is_unreachable() {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("configs.json");
    write_store(&store, &["Desk", "Couch"]);

    cmd(dir.path(), &store)
        .arg("list")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("1. Desk")
                .and(predicate::str::contains("2. Couch"))
                .and(predicate::str::contains("[active]").not()),
        )
        .stderr(predicate::str::contains("Listing without availability"));
}

#[test]
fn rename_and_remove_rewrite_the_store() {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("configs.json");
    write_store(&store, &["Desk", "Couch", "Travel"]);

    cmd(dir.path(), &store)
        .args(["rename", "Desk", "Office"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed \"Desk\" to \"Office\"."));

    cmd(dir.path(), &store)
        .args(["remove", "Desk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No saved configuration named Desk."));

    cmd(dir.path(), &store)
        .args(["remove", "Couch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed \"Couch\"."));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
    let names = json["configs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c[0].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Office", "Travel"]);
    assert_eq!(json["last_applied_index"], 0);
}

#[test]
fn rename_refuses_an_existing_name() {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("configs.json");
    write_store(&store, &["Desk", "Couch"]);
    let before = fs::read_to_string(&store).unwrap();

    cmd(dir.path(), &store)
        .args(["rename", "Desk", "Couch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(&store).unwrap(), before);
}

#[test]
fn apply_unknown_name_fails_before_contacting_the_display_service() {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("configs.json");
    write_store(&store, &["Desk"]);

    cmd(dir.path(), &store)
        .args(["apply", "Nowhere"])
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("No saved configuration named Nowhere.")
                .and(predicate::str::contains("Failed to read display state").not()),
        );
}

#[test]
fn status_reports_an_unreachable_display_service() {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("configs.json");

    cmd(dir.path(), &store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read display state"));
}
