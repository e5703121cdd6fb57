use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

#[test]
fn help_lists_the_pipeline_subcommands() {
    let output = Command::cargo_bin("proton-sdk-build")
        .expect("binary present")
        .arg("--help")
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    for subcommand in ["run", "check", "collect", "matrix", "package", "clean"] {
        assert!(stdout.contains(subcommand), "help missing '{subcommand}'");
    }
}

#[test]
fn completions_generate_for_bash() {
    Command::cargo_bin("proton-sdk-build")
        .expect("binary present")
        .args(["completions", "bash"])
        .assert()
        .success();
}

#[test]
fn collect_without_any_artifacts_exits_nonzero() {
    let temp = tempdir().unwrap();

    Command::cargo_bin("proton-sdk-build")
        .expect("binary present")
        .current_dir(temp.path())
        .arg("collect")
        .assert()
        .failure();
}

#[test]
fn package_assembles_archives_from_staged_directories() {
    let temp = tempdir().unwrap();
    let native_root = temp.path().join("native-libs");
    for rid in ["win-x64", "linux-x64", "osx-x64", "osx-arm64"] {
        let dir = native_root.join(rid);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("libproton_sdk.dll"), rid.as_bytes()).unwrap();
    }

    Command::cargo_bin("proton-sdk-build")
        .expect("binary present")
        .current_dir(temp.path())
        .args(["package", "--tag", "1.0.0"])
        .assert()
        .success();

    let dist = temp.path().join("dist");
    assert!(dist.join("proton-sdk-native-win-x64.zip").is_file());
    assert!(dist.join("proton-sdk-native-all-platforms.tar.gz").is_file());
    assert!(dist.join("release.json").is_file());
}

#[test]
fn package_without_matrix_output_exits_nonzero() {
    let temp = tempdir().unwrap();

    Command::cargo_bin("proton-sdk-build")
        .expect("binary present")
        .current_dir(temp.path())
        .args(["package", "--tag", "1.0.0"])
        .assert()
        .failure();
}
