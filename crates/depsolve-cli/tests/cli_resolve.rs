use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const REPOSITORY: &str = r#"
[[component]]
module = "org:lib"
versions = ["1.0", "2.0"]

[[component]]
module = "org:a"
version = "1.0"
dependencies = ["org:lib:1.0"]

[[component]]
module = "org:b"
version = "1.0"
dependencies = ["org:lib:2.0"]

[[project]]
path = ":core"
module = "com.acme:core"
dependencies = ["org:a:1.0"]
"#;

const MANIFEST: &str = r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
a = "org:a:1.0"
b = "org:b:1.0"
"#;

fn depsolve_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("depsolve").unwrap();
    cmd.current_dir(dir)
        .env("DEPSOLVE_HOME", dir.join(".depsolve"))
        .env_remove("DEPSOLVE_REPOSITORY")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace(manifest: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("depsolve.toml"), manifest).unwrap();
    fs::write(tmp.path().join("repository.toml"), REPOSITORY).unwrap();
    tmp
}

#[test]
fn test_resolve_prints_tree() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["resolve"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("com.acme:app:unspecified\n"))
        .stdout(predicate::str::contains("org:lib:1.0 -> 2.0"))
        .stdout(predicate::str::contains("└── org:b:1.0"));
}

#[test]
fn test_resolve_depth_limits_tree() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["resolve", "--depth", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org:a:1.0"))
        .stdout(predicate::str::contains("org:lib").not());
}

#[test]
fn test_resolve_json() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["resolve", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"components\""))
        .stdout(predicate::str::contains("\"dependencies\""))
        .stdout(predicate::str::contains("\"requested\": \"org:lib:1.0\""));
}

#[test]
fn test_resolve_json_from_global_config() {
    let tmp = workspace(MANIFEST);
    let home = tmp.path().join(".depsolve");
    fs::create_dir_all(&home).unwrap();
    fs::write(home.join("config.toml"), "[output]\nformat = \"json\"\n").unwrap();

    depsolve_cmd(tmp.path())
        .args(["resolve"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"components\""));
}

#[test]
fn test_resolve_conflicts() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["resolve", "--conflicts"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "org:lib requested 1.0, 2.0 but resolved 2.0 (by conflict resolution)",
        ));
}

#[test]
fn test_resolve_no_conflicts() {
    let tmp = workspace("[root]\ngroup = \"com.acme\"\nname = \"app\"\n\n[dependencies]\nb = \"org:b:1.0\"\n");
    depsolve_cmd(tmp.path())
        .args(["resolve", "--conflicts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No version conflicts."));
}

#[test]
fn test_resolve_build_deps_lists_projects() {
    let tmp = workspace(
        "[root]\ngroup = \"com.acme\"\nname = \"app\"\n\n[dependencies]\ncore = { project = \":core\" }\n",
    );
    depsolve_cmd(tmp.path())
        .args(["resolve", "--build-deps"])
        .assert()
        .success()
        .stdout(predicate::str::diff("project :core\n"));
}

#[test]
fn test_why_shows_dependents() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["why", "lib"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("org:lib:2.0 (by conflict resolution)"))
        .stdout(predicate::str::contains("org:a:1.0 (requested org:lib:1.0)"));
}

#[test]
fn test_why_unknown_module() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["why", "org:nothing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dependency 'org:nothing' not found in the graph."));
}

#[test]
fn test_path_to_module() {
    let tmp = workspace(MANIFEST);
    depsolve_cmd(tmp.path())
        .args(["path", "org:lib"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Path to org:lib:\ncom.acme:app:unspecified\n"))
        .stdout(predicate::str::contains("    org:lib:2.0"));
}

#[test]
fn test_missing_manifest_fails() {
    let tmp = TempDir::new().unwrap();
    depsolve_cmd(tmp.path())
        .args(["resolve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No manifest found"));
}

#[test]
fn test_explicit_manifest_and_repository_paths() {
    let tmp = TempDir::new().unwrap();
    let app = tmp.path().join("app");
    fs::create_dir_all(&app).unwrap();
    fs::write(app.join("build.toml"), MANIFEST).unwrap();
    fs::write(tmp.path().join("repo.toml"), REPOSITORY).unwrap();

    depsolve_cmd(tmp.path())
        .args(["resolve", "--manifest", "app/build.toml", "--repository", "repo.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org:b:1.0"));
}

#[test]
fn test_fatal_failure_exits_with_error() {
    let tmp = workspace(
        "[root]\ngroup = \"com.acme\"\nname = \"app\"\n\n[dependencies]\nmissing = \"org:missing:1.0\"\n",
    );
    depsolve_cmd(tmp.path())
        .args(["resolve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("org:missing:1.0"));
}
