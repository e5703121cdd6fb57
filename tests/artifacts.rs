use std::fs;
use std::path::Path;

use proton_sdk_build::artifacts::{self, EXPORT_PROJECTS};
use proton_sdk_build::error::BuildError;
use tempfile::tempdir;

fn touch(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn project_release_dir(sdk_dir: &Path, index: usize) -> std::path::PathBuf {
    EXPORT_PROJECTS[index].output_dir(sdk_dir)
}

#[test]
fn zero_matches_across_all_projects_is_fatal() {
    let temp = tempdir().unwrap();
    let sdk_dir = temp.path().join("Proton.SDK");
    // All three directories present, none with a matching library.
    for index in 0..EXPORT_PROJECTS.len() {
        touch(
            &project_release_dir(&sdk_dir, index).join("helper.dll"),
            b"nope",
        );
    }

    let dest = temp.path().join("native-libs");
    let err = artifacts::collect(&sdk_dir, &dest).unwrap_err();
    assert!(matches!(err, BuildError::NoArtifactsFound));
}

#[test]
fn absent_directories_are_skipped_but_matches_still_count() {
    let temp = tempdir().unwrap();
    let sdk_dir = temp.path().join("Proton.SDK");
    // Only the second project exists; it holds one match and one skip.
    let release = project_release_dir(&sdk_dir, 1);
    touch(&release.join("libproton_sdk.dll"), b"sdk");
    touch(&release.join("helper.dll"), b"helper");

    let dest = temp.path().join("native-libs");
    let count = artifacts::collect(&sdk_dir, &dest).unwrap();

    assert_eq!(count, 1);
    assert!(dest.join("libproton_sdk.dll").is_file());
    assert!(!dest.join("helper.dll").exists());
}

#[test]
fn discovery_is_recursive_through_framework_directories() {
    let temp = tempdir().unwrap();
    let sdk_dir = temp.path().join("Proton.SDK");
    let nested = project_release_dir(&sdk_dir, 0)
        .join("net9.0")
        .join("linux-x64")
        .join("publish");
    touch(&nested.join("libproton_sdk.so"), b"so");

    let dest = temp.path().join("native-libs");
    let count = artifacts::collect(&sdk_dir, &dest).unwrap();

    assert_eq!(count, 1);
    assert!(dest.join("libproton_sdk.so").is_file());
}

#[test]
fn non_library_files_are_ignored_even_when_named_like_matches() {
    let temp = tempdir().unwrap();
    let sdk_dir = temp.path().join("Proton.SDK");
    let release = project_release_dir(&sdk_dir, 0);
    touch(&release.join("proton_sdk.pdb"), b"symbols");
    touch(&release.join("proton_sdk.xml"), b"docs");
    touch(&release.join("proton_sdk.dll"), b"bits");

    let dest = temp.path().join("native-libs");
    let count = artifacts::collect(&sdk_dir, &dest).unwrap();

    assert_eq!(count, 1);
    assert!(dest.join("proton_sdk.dll").is_file());
    assert!(!dest.join("proton_sdk.pdb").exists());
    assert!(!dest.join("proton_sdk.xml").exists());
}

#[test]
fn name_collisions_resolve_last_write_wins() {
    let temp = tempdir().unwrap();
    let sdk_dir = temp.path().join("Proton.SDK");
    touch(
        &project_release_dir(&sdk_dir, 0).join("proton_core.dll"),
        b"from-first",
    );
    touch(
        &project_release_dir(&sdk_dir, 2).join("proton_core.dll"),
        b"from-third",
    );

    let dest = temp.path().join("native-libs");
    let count = artifacts::collect(&sdk_dir, &dest).unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        fs::read(dest.join("proton_core.dll")).unwrap(),
        b"from-third"
    );
}
