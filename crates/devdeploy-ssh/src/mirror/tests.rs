//! Unit tests for tree mirroring

use super::*;
use crate::test_utils::MemoryFs;
use std::fs;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_directory_structure_is_mirrored() {
    let local = TempDir::new().unwrap();
    write(local.path(), "a/b/c.txt", b"deep file");
    write(local.path(), "a/d.txt", b"shallow file");

    let remote = MemoryFs::new();
    remote.add_dir("/R");

    let summary = send(&remote, local.path(), &patterns(&["a"]), &RemotePath::new("/R")).unwrap();

    assert_eq!(remote.file("/R/a/b/c.txt").unwrap(), b"deep file");
    assert_eq!(remote.file("/R/a/d.txt").unwrap(), b"shallow file");
    assert_eq!(summary.files, 2);
    assert_eq!(summary.bytes, 21);
}

#[test]
fn test_trailing_separator_on_directory_pattern() {
    let local = TempDir::new().unwrap();
    write(local.path(), "bindings/pkg/__init__.py", b"");
    write(local.path(), "bindings/pkg/core.py", b"x = 1\n");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    send(&remote, local.path(), &patterns(&["bindings/pkg/"]), &RemotePath::new("/deploy")).unwrap();

    assert!(remote.file("/deploy/pkg/__init__.py").is_some());
    assert_eq!(remote.file("/deploy/pkg/core.py").unwrap(), b"x = 1\n");
}

#[test]
fn test_files_are_placed_flat() {
    let local = TempDir::new().unwrap();
    write(local.path(), "build/armv6/Release/libone.so", b"one");
    write(local.path(), "build/armv6/Release/libtwo.so", b"two");
    write(local.path(), "build/armv6/Release/notes.txt", b"skip");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    let summary = send(
        &remote,
        local.path(),
        &patterns(&["build/armv6/Release/*.so"]),
        &RemotePath::new("/deploy"),
    )
    .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(remote.file("/deploy/libone.so").unwrap(), b"one");
    assert_eq!(remote.file("/deploy/libtwo.so").unwrap(), b"two");
    assert!(remote.file("/deploy/notes.txt").is_none());
}

#[test]
fn test_unmatched_pattern_is_skipped() {
    let local = TempDir::new().unwrap();
    write(local.path(), "start.sh", b"#!/bin/sh\n");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    let summary = send(
        &remote,
        local.path(),
        &patterns(&["missing/*.so", "start.sh"]),
        &RemotePath::new("/deploy"),
    )
    .unwrap();

    assert_eq!(summary.unmatched, vec!["missing/*.so".to_string()]);
    assert_eq!(summary.files, 1);
}

#[test]
fn test_small_buffer_copies_whole_file() {
    let local = TempDir::new().unwrap();
    let contents: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    write(local.path(), "blob.bin", &contents);

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    let copied = copy_file(&remote, &local.path().join("blob.bin"), &RemotePath::new("/deploy"), 7).unwrap();

    assert_eq!(copied, 10_000);
    assert_eq!(remote.file("/deploy/blob.bin").unwrap(), contents);
    assert_eq!(remote.write_calls("/deploy/blob.bin"), 10_000usize.div_ceil(7));
}

#[test]
fn test_copy_overwrites_existing_file() {
    let local = TempDir::new().unwrap();
    write(local.path(), "start.sh", b"new");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");
    remote.add_file("/deploy/start.sh", b"old contents that are longer");

    copy_file(&remote, &local.path().join("start.sh"), &RemotePath::new("/deploy"), COPY_BUFFER_SIZE).unwrap();

    assert_eq!(remote.file("/deploy/start.sh").unwrap(), b"new");
}

#[test]
fn test_missing_local_file_is_local_failure() {
    let local = TempDir::new().unwrap();
    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    let result = copy_file(&remote, &local.path().join("nope.so"), &RemotePath::new("/deploy"), 16);
    assert!(matches!(result, Err(FileError::LocalIOFailure { .. })));
}

#[test]
fn test_remote_create_failure_is_remote_failure() {
    let local = TempDir::new().unwrap();
    write(local.path(), "testrobot", b"\x7fELF");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");
    remote.deny("/deploy/testrobot");

    let result = send(&remote, local.path(), &patterns(&["testrobot"]), &RemotePath::new("/deploy"));
    match result {
        Err(FileError::RemoteIOFailure { path, .. }) => assert_eq!(path, "/deploy/testrobot"),
        other => panic!("expected RemoteIOFailure, got {:?}", other),
    }
}

#[test]
fn test_remote_write_failure_is_remote_failure() {
    let local = TempDir::new().unwrap();
    write(local.path(), "lib.so", b"payload");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");
    remote.fail_writes("/deploy/lib.so");

    let result = send(&remote, local.path(), &patterns(&["lib.so"]), &RemotePath::new("/deploy"));
    assert!(matches!(result, Err(FileError::RemoteIOFailure { .. })));
}

#[test]
fn test_directory_creation_failure_propagates() {
    let local = TempDir::new().unwrap();
    write(local.path(), "pkg/sub/mod.py", b"");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");
    remote.deny("/deploy/pkg");

    let result = send(&remote, local.path(), &patterns(&["pkg"]), &RemotePath::new("/deploy"));
    assert!(matches!(result, Err(FileError::DirectoryCreationFailed { .. })));
}

#[cfg(unix)]
#[test]
fn test_symlink_loop_is_local_failure() {
    let local = TempDir::new().unwrap();
    write(local.path(), "pkg/mod.py", b"");
    std::os::unix::fs::symlink(local.path().join("pkg"), local.path().join("pkg/again")).unwrap();

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    let result = send(&remote, local.path(), &patterns(&["pkg"]), &RemotePath::new("/deploy"));
    assert!(matches!(result, Err(FileError::LocalIOFailure { .. })));
}

#[test]
fn test_base_dir_with_glob_metacharacters() {
    let local = TempDir::new().unwrap();
    let base = local.path().join("build[1]");
    write(&base, "start-py.sh", b"echo hi\n");

    let remote = MemoryFs::new();
    remote.add_dir("/deploy");

    let summary = send(&remote, &base, &patterns(&["start-*.sh"]), &RemotePath::new("/deploy")).unwrap();
    assert_eq!(summary.files, 1);
    assert!(remote.file("/deploy/start-py.sh").is_some());
}
