#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::rc::Rc;

use common::{code_of, fresh_fs, frozen};
use shadowfs::{Clock, ErrorCode, FileSet, FileSetEntry};

#[test]
fn shadow_sees_the_base_tree() {
    let base = fresh_fs();
    base.mkdir_sync("/a").unwrap();
    base.write_file_sync("/a/b.txt", "hi").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    assert_eq!(fork.read_file_string("/a/b.txt").unwrap(), "hi");
    assert_eq!(fork.readdir_sync("/a").unwrap(), ["b.txt"]);
}

#[test]
fn shadow_writes_do_not_touch_the_base() {
    let base = fresh_fs();
    base.mkdir_sync("/a").unwrap();
    base.write_file_sync("/a/b.txt", "hi").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    fork.write_file_sync("/a/b.txt", "bye").unwrap();
    assert_eq!(fork.read_file_string("/a/b.txt").unwrap(), "bye");
    assert_eq!(base.read_file_string("/a/b.txt").unwrap(), "hi");
}

#[test]
fn shadow_inodes_keep_the_base_identity() {
    let base = fresh_fs();
    base.write_file_sync("/f", "x").unwrap();
    let want = base.stat_sync("/f").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    let got = fork.stat_sync("/f").unwrap();
    assert_eq!(got.ino, want.ino);
    assert_eq!(got.dev, want.dev);
    assert_eq!(got.nlink, want.nlink);
    assert_eq!(got.birthtime_ms, want.birthtime_ms);
}

#[test]
fn shadow_materializes_each_source_inode_once() {
    let base = fresh_fs();
    base.write_file_sync("/f", "x").unwrap();
    base.link_sync("/f", "/g").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    assert_eq!(
        fork.stat_sync("/f").unwrap().ino,
        fork.stat_sync("/g").unwrap().ino
    );
}

#[test]
fn shadow_removals_do_not_touch_the_base() {
    let base = fresh_fs();
    base.mkdir_sync("/a").unwrap();
    base.write_file_sync("/a/b.txt", "hi").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    fork.unlink_sync("/a/b.txt").unwrap();
    assert!(!fork.exists_sync("/a/b.txt"));
    assert!(base.exists_sync("/a/b.txt"));
}

#[test]
fn shadow_additions_live_only_in_the_fork() {
    let base = fresh_fs();
    base.mkdir_sync("/a").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    fork.write_file_sync("/a/new.txt", "fork only").unwrap();
    assert!(fork.exists_sync("/a/new.txt"));
    assert!(!base.exists_sync("/a/new.txt"));
}

#[test]
fn shadow_copies_symlinks_eagerly() {
    let base = fresh_fs();
    base.write_file_sync("/t", "x").unwrap();
    base.symlink_sync("/t", "/l").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    assert_eq!(fork.readlink_sync("/l").unwrap(), "/t");
    assert!(fork.stat_sync("/l").unwrap().is_file());
}

#[test]
fn shadow_of_a_shadow_reads_through_both_layers() {
    let a = fresh_fs();
    a.write_file_sync("/f", "from a").unwrap();
    let a = frozen(a);
    let b = a.shadow();
    b.write_file_sync("/g", "from b").unwrap();
    let b = frozen(b);
    let c = b.shadow();
    assert_eq!(c.read_file_string("/f").unwrap(), "from a");
    assert_eq!(c.read_file_string("/g").unwrap(), "from b");
}

#[test]
fn shadow_inherits_cwd_and_clock() {
    let base = fresh_fs();
    base.mkdirp_sync("/work").unwrap();
    base.chdir("/work").unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    assert_eq!(fork.cwd(), "/work");
    assert_eq!(fork.time(), 1_000);
}

#[test]
fn filemeta_falls_back_to_the_shadow_source() {
    let base = fresh_fs();
    base.write_file_sync("/f", "x").unwrap();
    base.filemeta("/f").unwrap().set("origin", "base");
    let base = frozen(base);
    let fork = base.shadow();
    let meta = fork.filemeta("/f").unwrap();
    assert_eq!(
        meta.get("origin"),
        Some(serde_json::Value::String("base".to_string()))
    );
    meta.set("origin", "fork");
    assert_eq!(
        fork.filemeta("/f").unwrap().get("origin"),
        Some(serde_json::Value::String("fork".to_string()))
    );
}

#[test]
fn fs_meta_falls_back_to_the_base() {
    let base = fresh_fs();
    base.meta().set("tier", "base");
    let base = frozen(base);
    let fork = base.shadow();
    assert_eq!(
        fork.meta().get("tier"),
        Some(serde_json::Value::String("base".to_string()))
    );
}

#[test]
#[should_panic(expected = "cannot shadow a mutable file system")]
fn shadow_of_a_mutable_filesystem_panics() {
    let base = Rc::new(fresh_fs());
    let _ = base.shadow();
}

#[test]
#[should_panic(expected = "case-insensitive")]
fn case_insensitive_shadow_of_a_case_sensitive_base_panics() {
    let base = frozen(fresh_fs());
    let _ = base.shadow_with(true);
}

#[test]
fn case_sensitive_shadow_of_a_case_insensitive_base_is_allowed() {
    let base = common::fresh_fs_ignore_case();
    base.write_file_sync("/File.txt", "x").unwrap();
    let base = frozen(base);
    let fork = base.shadow_with(false);
    assert!(!fork.ignore_case());
    assert_eq!(fork.read_file_string("/File.txt").unwrap(), "x");
}

#[test]
fn readonly_filesystem_rejects_every_mutation() {
    let fs = fresh_fs();
    fs.mkdir_sync("/d").unwrap();
    fs.write_file_sync("/d/f", "x").unwrap();
    fs.make_readonly();
    assert!(fs.is_readonly());

    assert_eq!(code_of(fs.mkdir_sync("/e")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.rmdir_sync("/d")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.write_file_sync("/d/f", "y")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.link_sync("/d/f", "/g")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.unlink_sync("/d/f")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.rename_sync("/d/f", "/g")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.symlink_sync("/d/f", "/l")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.filemeta("/d/f")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.chdir("/d")), ErrorCode::EROFS);
    assert_eq!(code_of(fs.pushd(Some("/d"))), ErrorCode::EROFS);
    assert_eq!(code_of(fs.popd()), ErrorCode::EROFS);
    assert_eq!(code_of(fs.rimraf_sync("/d")), ErrorCode::EROFS);
    assert_eq!(
        code_of(fs.apply(&FileSet::new().entry("/x", "y"))),
        ErrorCode::EROFS
    );
    assert_eq!(code_of(fs.set_time(Clock::Fixed(0))), ErrorCode::EPERM);

    // Nothing observable changed.
    assert_eq!(fs.read_file_string("/d/f").unwrap(), "x");
    assert_eq!(fs.readdir_sync("/d").unwrap(), ["f"]);
    assert_eq!(fs.time(), 1_000);
}

#[test]
fn reads_on_a_frozen_filesystem_still_work() {
    let fs = fresh_fs();
    fs.write_file_sync("/f", "x").unwrap();
    fs.make_readonly();
    assert_eq!(fs.read_file_string("/f").unwrap(), "x");
    assert!(fs.stat_sync("/f").unwrap().is_file());
}

#[test]
fn fileset_populated_base_shadows_cleanly() {
    let base = shadowfs::FileSystem::new(shadowfs::FileSystemOptions {
        cwd: Some("/".to_string()),
        time: Some(Clock::Fixed(0)),
        files: Some(
            FileSet::new()
                .entry("/src", FileSet::new().entry("lib.rs", "pub fn f() {}"))
                .entry("/readme.md", FileSetEntry::file("docs")),
        ),
        ..Default::default()
    })
    .unwrap();
    let base = frozen(base);
    let fork = base.shadow();
    assert_eq!(fork.readdir_sync("/src").unwrap(), ["lib.rs"]);
    assert_eq!(fork.read_file_string("/readme.md").unwrap(), "docs");
}
