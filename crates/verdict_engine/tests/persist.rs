use std::fs;

use chrono::Utc;
use verdict_core::{ItemStatus, Label, Outcome, SourceItem, StateStorage, StorageError, WorkItemStore};
use verdict_engine::{ensure_dir, AtomicFileWriter, FileStorage};
use tempfile::TempDir;

#[test]
fn creates_missing_state_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("state");
    assert!(!new_dir.exists());
    ensure_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("state.json", b"hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "state.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = writer.write("state.json", b"world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("state.json", b"data").is_err());
    assert!(!file_path.with_file_name("state.json").exists());
}

#[test]
fn file_storage_saves_loads_and_removes() {
    let temp = TempDir::new().unwrap();
    let storage = FileStorage::new(temp.path().join("state"));

    assert_eq!(storage.load("run").unwrap(), None);
    storage.save("run", "{\"a\":1}").unwrap();
    assert_eq!(storage.load("run").unwrap().as_deref(), Some("{\"a\":1}"));
    assert!(temp.path().join("state").join("run.json").is_file());

    storage.remove("run").unwrap();
    assert_eq!(storage.load("run").unwrap(), None);
    // Removing twice is fine.
    storage.remove("run").unwrap();
}

#[test]
fn file_storage_rejects_path_like_keys() {
    let temp = TempDir::new().unwrap();
    let storage = FileStorage::new(temp.path());
    assert!(matches!(
        storage.save("../escape", "x"),
        Err(StorageError::InvalidKey(_))
    ));
    assert!(matches!(storage.load(""), Err(StorageError::InvalidKey(_))));
}

#[test]
fn store_state_survives_reopen_from_disk() {
    verdict_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    {
        let (mut store, _) = WorkItemStore::open(Box::new(FileStorage::new(temp.path()))).unwrap();
        store
            .seed(vec![
                SourceItem::new("https://a", 2, "截图链接").with_expected(Label::Qualified),
                SourceItem::new("https://b", 3, "截图链接"),
            ])
            .unwrap();
        store.begin_run(0, Utc::now()).unwrap();
        store.mark_in_flight(0).unwrap();
        store
            .mark_succeeded(0, Outcome::Text("合格".into()), Label::Qualified)
            .unwrap();
        store.mark_in_flight(1).unwrap();
    }

    let (store, report) = WorkItemStore::open(Box::new(FileStorage::new(temp.path()))).unwrap();
    assert_eq!(report.reverted, vec![1]);
    let statuses: Vec<_> = store.state().items().iter().map(|item| item.status()).collect();
    assert_eq!(statuses, vec![ItemStatus::Succeeded, ItemStatus::Pending]);
    assert_eq!(store.state().items()[0].matches_expected(), Some(true));
}
