use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn config_show_merges_file_values_and_cli_overrides() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");

    let config_contents = r#"
busctl_command = "busctl --user --timeout=5"
debounce_ms = 250
settle_ms = 2000
restore_on_start = true
"#;
    fs::write(&config_path, config_contents).expect("write config");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("displayswitch");
    cmd.args([
        "--config",
        config_path.to_str().expect("config path"),
        "--store",
        "/tmp/displayswitch-test/configs.json",
        "config-show",
        "--confirm",
        "--no-restore",
    ]);

    cmd.assert().success().stdout(
        predicate::str::contains("Displayswitch: Config path:")
            .and(predicate::str::contains(config_path.to_str().unwrap()))
            .and(predicate::str::contains("/tmp/displayswitch-test/configs.json"))
            .and(predicate::str::contains(
                "[\"busctl\", \"--user\", \"--timeout=5\"]",
            ))
            .and(predicate::str::contains("| debounce_ms "))
            .and(predicate::str::contains("250"))
            .and(predicate::str::contains("2000"))
            .and(predicate::str::contains("| confirm_apply    | true"))
            .and(predicate::str::contains("| restore_on_start | false")),
    );
}

#[test]
fn config_show_defaults_store_next_to_config_file() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("displayswitch");
    cmd.args(["--config", config_path.to_str().unwrap(), "config-show"]);

    let expected_store = dir.path().join("configs.json");
    cmd.assert().success().stdout(
        predicate::str::contains(expected_store.to_str().unwrap())
            .and(predicate::str::contains("[\"busctl\", \"--user\"]"))
            .and(predicate::str::contains("(unset)")),
    );
}

#[test]
fn config_show_rejects_unbalanced_busctl_command() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("displayswitch");
    cmd.args([
        "--config",
        config_path.to_str().unwrap(),
        "--busctl",
        "busctl \"--user",
        "config-show",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse busctl_command"));
}
