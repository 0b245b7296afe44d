//! Store Integration Tests
//!
//! An application store resolved from a container, persisted through a
//! recording backend, and observed through its cells.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use signals_store_core::inject::{resolve_many, resolve_one, Container, Injectable, SignalStore};
use signals_store_core::reactive::Effect;
use signals_store_core::storage::{KeyValueStorage, MemoryStorage, SharedStorage, StorageError};
use signals_store_core::store::{Selector, Store, StoreConfig};
use signals_store_core::{store_set, store_state, Result, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub products: Vec<String>,
}

store_state! {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AppState {
        pub user: Arc<User>,
        pub loading: bool,
        pub error: Option<String>,
    }
    pub struct AppStateCells;
    pub struct AppStatePatch;
}

fn initial_state(first_name: &str, last_name: &str) -> AppState {
    AppState {
        user: Arc::new(User {
            first_name: first_name.into(),
            last_name: last_name.into(),
            products: Vec::new(),
        }),
        loading: false,
        error: None,
    }
}

fn build_store(container: &Container, state: AppState, storage_key: &str) -> Result<Store<AppState>> {
    let config = container.resolve::<StoreConfig>()?;
    let storage = container.resolve::<SharedStorage>()?;
    Ok(Store::with_config(
        state,
        Some(storage_key),
        SharedStorage::clone(&storage),
        &config,
    ))
}

pub struct AppStore {
    store: Store<AppState>,
    pub full_name: Selector<String>,
}

impl AppStore {
    fn from_store(store: Store<AppState>) -> Self {
        let full_name = store.select(|cells| {
            cells
                .user
                .with(|user| format!("{} {}", user.first_name, user.last_name))
        });
        Self { store, full_name }
    }

    pub fn set_last_name(&self, last_name: &str) {
        self.store
            .set(|draft| Arc::make_mut(&mut draft.user).last_name = last_name.to_owned());
    }

    pub fn set_loading(&self, loading: bool) {
        self.store.set(|draft| draft.loading = loading);
    }

    pub fn products_loaded(&self, products: Vec<String>) {
        self.store.set(|draft| {
            Arc::make_mut(&mut draft.user).products = products;
            draft.loading = false;
        });
    }
}

impl Injectable for AppStore {
    fn inject(container: &Container) -> Result<Self> {
        build_store(container, initial_state("store-1", "last-1"), "app-store").map(Self::from_store)
    }
}

impl SignalStore for AppStore {
    type State = AppState;

    fn store(&self) -> &Store<AppState> {
        &self.store
    }
}

pub struct SecondaryStore {
    store: Store<AppState>,
}

impl SecondaryStore {
    pub fn set_error(&self, error: &str) {
        self.store.set(|draft| draft.error = Some(error.to_owned()));
    }
}

impl Injectable for SecondaryStore {
    fn inject(container: &Container) -> Result<Self> {
        let store = build_store(container, initial_state("store-2", "last-2"), "app-store1")?;
        Ok(Self { store })
    }
}

impl SignalStore for SecondaryStore {
    type State = AppState;

    fn store(&self) -> &Store<AppState> {
        &self.store
    }
}

store_set! {
    pub struct Stores {
        pub a: AppStore,
        pub b: SecondaryStore,
    }
}

/// Memory backend that records every write.
#[derive(Default)]
struct RecordingStorage {
    backend: MemoryStorage,
    writes: Mutex<Vec<(String, String)>>,
}

impl RecordingStorage {
    fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }
}

impl KeyValueStorage for RecordingStorage {
    fn get_item(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        self.backend.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        self.writes.lock().push((key.to_owned(), value.to_owned()));
        self.backend.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> std::result::Result<(), StorageError> {
        self.backend.remove_item(key)
    }
}

/// Backend that refuses every call.
struct DisabledStorage;

impl KeyValueStorage for DisabledStorage {
    fn get_item(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("disabled".into()))
    }

    fn set_item(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
        Err(StorageError::Unavailable("disabled".into()))
    }

    fn remove_item(&self, _key: &str) -> std::result::Result<(), StorageError> {
        Err(StorageError::Unavailable("disabled".into()))
    }
}

fn recording_container() -> (Container, Arc<RecordingStorage>) {
    let recording = Arc::new(RecordingStorage::default());
    let container = Container::new();
    container.provide(SharedStorage::from_arc(recording.clone()));
    (container, recording)
}

fn past_debounce() -> Duration {
    Duration::from_millis(150)
}

#[tokio::test(start_paused = true)]
async fn noop_set_changes_nothing_and_writes_nothing() {
    let (container, recording) = recording_container();
    let app = resolve_one::<AppStore>(&container).unwrap();
    let user = app.fields().user.get_untracked();

    let changes = app.store().set(|_| {});
    assert!(changes.is_empty());
    assert!(!app.store().has_pending_write());

    tokio::time::sleep(past_debounce()).await;
    assert!(recording.writes().is_empty());
    assert!(Arc::ptr_eq(&user, &app.fields().user.get_untracked()));
}

#[test]
fn single_field_change_keeps_other_identities() {
    let container = Container::new();
    let app = resolve_one::<AppStore>(&container).unwrap();
    let user = app.fields().user.get_untracked();

    app.set_loading(true);

    assert!(app.fields().loading.get());
    assert!(Arc::ptr_eq(&user, &app.fields().user.get_untracked()));
    assert_eq!(app.fields().user.version(), 0);
    assert_eq!(app.fields().error.version(), 0);
}

#[test]
fn unknown_patch_field_fails_loudly() {
    let container = Container::new();
    let app = resolve_one::<AppStore>(&container).unwrap();

    let err = app
        .store()
        .patch_fields(|_| Map::from_iter([("theme".to_string(), json!("dark"))]))
        .unwrap_err();

    assert!(matches!(err, StoreError::UnknownField { ref field } if field == "theme"));
    assert!(err.to_string().contains("theme"));
}

#[tokio::test(start_paused = true)]
async fn unchanged_patch_writes_nothing() {
    let (container, recording) = recording_container();
    let app = resolve_one::<AppStore>(&container).unwrap();

    let changes = app
        .store()
        .patch_fields(|state| {
            Map::from_iter([
                ("loading".to_string(), json!(state.loading)),
                ("user".to_string(), serde_json::to_value(&*state.user).unwrap()),
            ])
        })
        .unwrap();

    assert!(changes.is_empty());
    tokio::time::sleep(past_debounce()).await;
    assert!(recording.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn state_round_trips_through_storage() {
    let storage = SharedStorage::memory();

    {
        let container = Container::new();
        container.provide(storage.clone());
        let app = resolve_one::<AppStore>(&container).unwrap();
        app.set_last_name("lovelace");

        tokio::time::sleep(past_debounce()).await;
    }

    let container = Container::new();
    container.provide(storage.clone());
    let app = resolve_one::<AppStore>(&container).unwrap();

    assert_eq!(app.fields().user.get().last_name, "lovelace");
    assert_eq!(app.fields().user.get().first_name, "store-1");
    assert!(!app.fields().loading.get());
    assert_eq!(app.full_name.get(), "store-1 lovelace");
}

#[tokio::test(start_paused = true)]
async fn rapid_mutations_coalesce_into_one_write() {
    let (container, recording) = recording_container();
    let app = resolve_one::<AppStore>(&container).unwrap();

    for round in 0..5 {
        app.set_last_name(&format!("name-{round}"));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(recording.writes().is_empty());

    tokio::time::sleep(past_debounce()).await;

    let writes = recording.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "ng_store_app-store");

    let saved: Value = serde_json::from_str(&writes[0].1).unwrap();
    assert_eq!(saved["user"]["last_name"], json!("name-4"));
}

#[tokio::test(start_paused = true)]
async fn clear_cache_restores_initial_state_on_rebuild() {
    let storage = SharedStorage::memory();

    {
        let container = Container::new();
        container.provide(storage.clone());
        let app = resolve_one::<AppStore>(&container).unwrap();
        app.set_last_name("hopper");
        app.set_loading(true);
        tokio::time::sleep(past_debounce()).await;

        app.clear_cache();
        assert!(storage.get_item("ng_store_app-store").unwrap().is_none());
        // In-memory state survives the clear.
        assert_eq!(app.fields().user.get().last_name, "hopper");
    }

    let container = Container::new();
    container.provide(storage);
    let app = resolve_one::<AppStore>(&container).unwrap();
    assert_eq!(app.store().snapshot(), initial_state("store-1", "last-1"));
}

#[tokio::test(start_paused = true)]
async fn clear_cache_drops_a_pending_write() {
    let (container, recording) = recording_container();
    let app = resolve_one::<AppStore>(&container).unwrap();

    app.set_loading(true);
    assert!(app.store().has_pending_write());
    app.clear_cache();

    tokio::time::sleep(past_debounce()).await;
    assert!(recording.writes().is_empty());
}

#[test]
fn resolve_many_exposes_methods_and_fields() {
    let container = Container::new();
    let stores = resolve_many::<Stores>(&container).unwrap();

    stores.a.set_last_name("turing");
    stores.b.set_error("offline");

    assert_eq!(stores.a.fields().user.get().last_name, "turing");
    assert_eq!(stores.a.full_name.get(), "store-1 turing");
    assert_eq!(stores.b.fields().error.get().as_deref(), Some("offline"));
    assert_eq!(stores.b.fields().user.get().first_name, "store-2");

    // Same singletons as a direct resolution.
    let (a, b) = resolve_many::<(AppStore, SecondaryStore)>(&container).unwrap();
    assert!(Arc::ptr_eq(a.instance(), stores.a.instance()));
    assert_eq!(b.fields().error.get().as_deref(), Some("offline"));
}

#[test]
fn effects_run_only_for_changed_fields() {
    let container = Container::new();
    let app = resolve_one::<AppStore>(&container).unwrap();

    let loading_runs = Arc::new(AtomicUsize::new(0));
    let user_runs = Arc::new(AtomicUsize::new(0));

    let (fields, runs) = (app.fields().clone(), loading_runs.clone());
    let _loading_effect = Effect::new(move || {
        fields.loading.get();
        runs.fetch_add(1, Ordering::SeqCst);
    });

    let (fields, runs) = (app.fields().clone(), user_runs.clone());
    let _user_effect = Effect::new(move || {
        fields.user.get();
        runs.fetch_add(1, Ordering::SeqCst);
    });

    app.set_last_name("knuth");
    assert_eq!(loading_runs.load(Ordering::SeqCst), 1);
    assert_eq!(user_runs.load(Ordering::SeqCst), 2);

    // Two fields in one update: each effect runs once more.
    app.set_loading(true);
    app.products_loaded(vec!["book".into()]);
    assert_eq!(loading_runs.load(Ordering::SeqCst), 3);
    assert_eq!(user_runs.load(Ordering::SeqCst), 3);
}

#[test]
fn disabled_storage_keeps_the_store_working() {
    let container = Container::new();
    container.provide(SharedStorage::new(DisabledStorage));

    let app = resolve_one::<AppStore>(&container).unwrap();
    app.set_loading(true);
    app.clear_cache();
    app.store().flush();

    assert!(app.fields().loading.get());
}

#[test]
fn corrupt_blob_falls_back_to_initial_state() {
    let storage = SharedStorage::memory();
    storage
        .set_item("ng_store_app-store", "{\"user\": ")
        .unwrap();

    let container = Container::new();
    container.provide(storage);
    let app = resolve_one::<AppStore>(&container).unwrap();

    assert_eq!(app.store().snapshot(), initial_state("store-1", "last-1"));
}

#[test]
fn custom_prefix_from_config() {
    let container = Container::new();
    let config = StoreConfig::from_json(r#"{ "storage_prefix": "myapp" }"#).unwrap();
    container.provide(config);

    let app = resolve_one::<AppStore>(&container).unwrap();
    assert_eq!(app.store().storage_key(), Some("myapp_app-store"));
}
