//! Lookups that arrive after a task loader was closed.
//!
//! Threads spawned by a task can outlive it. Their class loads must still
//! resolve (from disk, through the fallback loader) instead of surfacing
//! opaque failures, and the first such lookup emits exactly one warning.

mod common;

use std::sync::Arc;

use common::{boot_loader, classpath_with, options_with_sink, CaptureSink};
use strata_loader::{ClassLoader, LoaderOptions, LoaderPool};

#[test]
fn test_post_close_lookup_served_with_single_warning() {
    let deps = classpath_with(&[("dep.Foo", b"dep-foo")]);
    let sink = CaptureSink::new();
    let pool = LoaderPool::new(
        vec![deps.path().to_path_buf()],
        boot_loader(),
        options_with_sink(sink.clone()),
    );

    let temp = tempfile::tempdir().unwrap();
    let task = pool
        .checkout(vec![deps.path().to_path_buf()], temp.path().to_path_buf())
        .unwrap();
    task.close();

    // A leaked thread still holds the loader and keeps loading through it.
    let late = task.load_class("dep.Foo").unwrap();
    assert_eq!(late.bytes(), b"dep-foo");

    let warnings = sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("dep.Foo"));

    // Later lookups reuse the fallback quietly.
    task.load_class("dep.Foo").unwrap();
    assert!(task.find_resource("dep/Foo.class").is_some());
    assert_eq!(sink.warnings().len(), 1);
}

#[test]
fn test_allow_zombies_suppresses_warning() {
    let deps = classpath_with(&[("dep.Foo", b"dep-foo")]);
    let sink = CaptureSink::new();
    let options = LoaderOptions {
        allow_zombies: true,
        ..options_with_sink(sink.clone())
    };
    let pool = LoaderPool::new(vec![deps.path().to_path_buf()], boot_loader(), options);

    let temp = tempfile::tempdir().unwrap();
    let task = pool
        .checkout(vec![deps.path().to_path_buf()], temp.path().to_path_buf())
        .unwrap();
    task.close();

    task.load_class("dep.Foo").unwrap();
    assert!(sink.warnings().is_empty());
}

#[test]
fn test_post_close_lookup_from_spawned_thread() {
    let deps = classpath_with(&[("dep.Worker", b"worker")]);
    let pool = LoaderPool::new(
        vec![deps.path().to_path_buf()],
        boot_loader(),
        LoaderOptions {
            allow_zombies: true,
            ..LoaderOptions::default()
        },
    );

    let temp = tempfile::tempdir().unwrap();
    let task = pool
        .checkout(vec![deps.path().to_path_buf()], temp.path().to_path_buf())
        .unwrap();

    let leaked = task.clone();
    task.close();

    let handle = std::thread::Builder::new()
        .name("leaked-worker".into())
        .spawn(move || leaked.load_class("dep.Worker").map(|c| c.bytes().to_vec()))
        .unwrap();
    let bytes = handle.join().unwrap().unwrap();
    assert_eq!(bytes, b"worker");
}

#[test]
fn test_unresolvable_lookup_after_classpath_removal() {
    let root = tempfile::tempdir().unwrap();
    let entry = root.path().join("build-output");
    std::fs::create_dir_all(&entry).unwrap();
    common::write_class(&entry, "app.Gone", b"gone");

    let pool = LoaderPool::new(
        vec![],
        boot_loader(),
        LoaderOptions {
            allow_zombies: true,
            ..LoaderOptions::default()
        },
    );
    let temp = tempfile::tempdir().unwrap();
    let task = pool
        .checkout(vec![entry.clone()], temp.path().to_path_buf())
        .unwrap();
    task.close();

    // The build output was cleaned between close and the late lookup; the
    // fallback reports the missing entry on stderr and surfaces not-found.
    std::fs::remove_dir_all(&entry).unwrap();
    let err = task.load_class("app.Gone").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_classes_defined_before_close_keep_identity() {
    let deps = classpath_with(&[("dep.Foo", b"dep-foo")]);
    let app = classpath_with(&[("app.Local", b"local")]);
    let pool = LoaderPool::new(
        vec![deps.path().to_path_buf()],
        boot_loader(),
        LoaderOptions {
            allow_zombies: true,
            ..LoaderOptions::default()
        },
    );

    let temp = tempfile::tempdir().unwrap();
    let task = pool
        .checkout(
            vec![deps.path().to_path_buf(), app.path().to_path_buf()],
            temp.path().to_path_buf(),
        )
        .unwrap();
    let local_before = task.load_class("app.Local").unwrap();
    task.close();

    // The fallback consults the closed loader's definitions first, so a
    // class defined during the task keeps its identity afterwards.
    let local_after = task.load_class("app.Local").unwrap();
    assert!(Arc::ptr_eq(&local_before, &local_after));
}
