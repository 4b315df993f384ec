#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::rc::Rc;

use common::{code_of, fresh_fs, CountingResolver};
use shadowfs::{ErrorCode, FileSystem, FileSystemOptions};

#[test]
fn mount_defers_all_resolver_work() {
    let fs = fresh_fs();
    let resolver = Rc::new(
        CountingResolver::new()
            .dir("/src", &["f"])
            .file("/src/f", b"abc"),
    );
    fs.mount_sync("/src", "/m", resolver.clone()).unwrap();
    assert!(resolver.readdir_calls.borrow().is_empty());
    assert!(resolver.stat_calls.borrow().is_empty());
    assert!(resolver.read_file_calls.borrow().is_empty());
}

#[test]
fn mounted_children_materialize_on_first_traversal() {
    let fs = fresh_fs();
    let resolver = Rc::new(
        CountingResolver::new()
            .dir("/src", &["f"])
            .file("/src/f", b"abc"),
    );
    fs.mount_sync("/src", "/m", resolver.clone()).unwrap();
    assert_eq!(fs.readdir_sync("/m").unwrap(), ["f"]);
    assert_eq!(*resolver.readdir_calls.borrow(), ["/src"]);
    // Sizes come from stat; content has not been read yet.
    assert_eq!(fs.stat_sync("/m/f").unwrap().size, 3);
    assert!(resolver.read_file_calls.borrow().is_empty());
}

#[test]
fn file_content_loads_exactly_once() {
    let fs = fresh_fs();
    let resolver = Rc::new(
        CountingResolver::new()
            .dir("/src", &["f"])
            .file("/src/f", b"abc"),
    );
    fs.mount_sync("/src", "/m", resolver.clone()).unwrap();
    assert!(resolver.read_file_calls.borrow().is_empty());
    assert_eq!(fs.read_file_string("/m/f").unwrap(), "abc");
    assert_eq!(resolver.read_file_count("/src/f"), 1);
    assert_eq!(fs.read_file_string("/m/f").unwrap(), "abc");
    assert_eq!(resolver.read_file_count("/src/f"), 1);
}

#[test]
fn directory_expansion_is_one_shot() {
    let fs = fresh_fs();
    let resolver = Rc::new(
        CountingResolver::new()
            .dir("/src", &["f"])
            .file("/src/f", b"abc"),
    );
    fs.mount_sync("/src", "/m", resolver.clone()).unwrap();
    fs.readdir_sync("/m").unwrap();
    fs.readdir_sync("/m").unwrap();
    fs.stat_sync("/m/f").unwrap();
    assert_eq!(resolver.readdir_calls.borrow().len(), 1);
}

#[test]
fn nested_directories_expand_lazily() {
    let fs = fresh_fs();
    let resolver = Rc::new(
        CountingResolver::new()
            .dir("/src", &["sub", "top.txt"])
            .dir("/src/sub", &["inner.txt"])
            .file("/src/top.txt", b"top")
            .file("/src/sub/inner.txt", b"inner"),
    );
    fs.mount_sync("/src", "/m", resolver.clone()).unwrap();
    assert_eq!(fs.readdir_sync("/m").unwrap(), ["sub", "top.txt"]);
    assert_eq!(*resolver.readdir_calls.borrow(), ["/src"]);
    assert_eq!(fs.read_file_string("/m/sub/inner.txt").unwrap(), "inner");
    assert_eq!(*resolver.readdir_calls.borrow(), ["/src", "/src/sub"]);
}

#[test]
fn mounted_entries_are_writable_after_materialization() {
    let fs = fresh_fs();
    let resolver = Rc::new(
        CountingResolver::new()
            .dir("/src", &["f"])
            .file("/src/f", b"abc"),
    );
    fs.mount_sync("/src", "/m", resolver.clone()).unwrap();
    fs.write_file_sync("/m/f", "replaced").unwrap();
    assert_eq!(fs.read_file_string("/m/f").unwrap(), "replaced");
    // The replacement never consulted the resolver.
    assert_eq!(resolver.read_file_count("/src/f"), 0);
}

#[test]
fn mount_over_an_existing_name_fails_eexist() {
    let fs = fresh_fs();
    fs.mkdir_sync("/m").unwrap();
    let resolver = Rc::new(CountingResolver::new().dir("/src", &[]));
    assert_eq!(
        code_of(fs.mount_sync("/src", "/m", resolver)),
        ErrorCode::EEXIST
    );
}

#[test]
fn mount_requires_an_absolute_source() {
    let fs = fresh_fs();
    let resolver = Rc::new(CountingResolver::new().dir("/src", &[]));
    assert_eq!(
        code_of(fs.mount_sync("relative", "/m", resolver)),
        ErrorCode::EINVAL
    );
}

#[test]
fn resolver_errors_surface_to_the_caller() {
    let fs = fresh_fs();
    // "/src" is never registered, so expansion fails inside the resolver.
    let resolver = Rc::new(CountingResolver::new());
    fs.mount_sync("/src", "/m", resolver).unwrap();
    assert_eq!(code_of(fs.readdir_sync("/m")), ErrorCode::ENOENT);
}

#[test]
fn one_filesystem_mounts_into_another() {
    let provider = fresh_fs();
    provider.mkdirp_sync("/data/sub").unwrap();
    provider.write_file_sync("/data/hello.txt", "from provider").unwrap();
    provider.write_file_sync("/data/sub/deep.txt", "deep").unwrap();
    let provider = Rc::new(provider);

    let fs = FileSystem::new(FileSystemOptions {
        cwd: Some("/".to_string()),
        ..Default::default()
    })
    .unwrap();
    fs.mount_sync("/data", "/remote", provider.clone()).unwrap();
    assert_eq!(fs.readdir_sync("/remote").unwrap(), ["hello.txt", "sub"]);
    assert_eq!(
        fs.read_file_string("/remote/hello.txt").unwrap(),
        "from provider"
    );
    assert_eq!(fs.read_file_string("/remote/sub/deep.txt").unwrap(), "deep");
}
