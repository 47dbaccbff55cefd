//! Pool shutdown, including shutdown racing an in-flight task.

mod common;

use common::{boot_loader, classpath_with};
use strata_loader::{ClassLoader, LoaderError, LoaderOptions, LoaderPool};

#[test]
fn test_checkout_after_close_is_rejected() {
    let pool = LoaderPool::new(vec![], boot_loader(), LoaderOptions::default());
    pool.close();

    let temp = tempfile::tempdir().unwrap();
    let err = pool
        .checkout(vec![], temp.path().to_path_buf())
        .unwrap_err();
    assert!(matches!(err, LoaderError::PoolClosed));
}

#[test]
fn test_close_empties_slot_and_closes_occupant() {
    let pool = LoaderPool::new(vec![], boot_loader(), LoaderOptions::default());
    let temp = tempfile::tempdir().unwrap();

    let task = pool.checkout(vec![], temp.path().to_path_buf()).unwrap();
    let dep = task.dependency_loader().clone();
    task.close();
    assert!(pool.has_idle());

    pool.close();
    assert!(!pool.has_idle());
    assert!(dep.is_closed());
}

#[test]
fn test_checkin_into_closed_pool_closes_loader() {
    let pool = LoaderPool::new(vec![], boot_loader(), LoaderOptions::default());
    let temp = tempfile::tempdir().unwrap();

    let task = pool.checkout(vec![], temp.path().to_path_buf()).unwrap();
    let dep = task.dependency_loader().clone();

    pool.close();
    task.close();

    assert!(dep.is_closed());
    assert!(!pool.has_idle());
}

#[test]
fn test_task_still_loads_while_pool_closes() {
    let deps = classpath_with(&[("dep.Foo", b"dep-foo")]);
    let pool = LoaderPool::new(
        vec![deps.path().to_path_buf()],
        boot_loader(),
        LoaderOptions::default(),
    );
    let temp = tempfile::tempdir().unwrap();
    let task = pool
        .checkout(vec![deps.path().to_path_buf()], temp.path().to_path_buf())
        .unwrap();

    // Closing the pool does not close loaders that are out on a task.
    pool.close();
    assert!(task.load_class("dep.Foo").is_ok());
    task.close();
}

#[test]
fn test_pool_close_races_task_close() {
    common::init_tracing();
    for _ in 0..100 {
        let pool = LoaderPool::new(vec![], boot_loader(), LoaderOptions::default());
        let temp = tempfile::tempdir().unwrap();
        let task = pool.checkout(vec![], temp.path().to_path_buf()).unwrap();
        let dep = task.dependency_loader().clone();

        let closer = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.close())
        };
        let finisher = std::thread::spawn(move || task.close());
        closer.join().unwrap();
        finisher.join().unwrap();

        // Whatever the interleaving, the dependency loader ends closed and
        // the slot ends empty.
        assert!(dep.is_closed());
        assert!(!pool.has_idle());
    }
}

#[test]
fn test_close_is_idempotent() {
    let pool = LoaderPool::new(vec![], boot_loader(), LoaderOptions::default());
    pool.close();
    pool.close();
    assert!(pool.is_closed());
}
