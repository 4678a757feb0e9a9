//! Deterministic in-memory engine used by the test suites and dry runs.
//!
//! Document state lives behind a shared handle so it stays inspectable after
//! every engine-side handle has been closed. Faults are scripted per provider,
//! which keeps each scenario self-contained.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AutomationEngine, EngineDocument, EngineFault, EngineProvider, PropertySet};
use crate::properties::CUSTOM_PROPERTY_SET;

#[derive(Debug, Default)]
struct SimState {
    documents: BTreeMap<PathBuf, DocumentState>,
    attach_available: bool,
    fail_create: bool,
    fail_save: bool,
    failing_fields: Vec<String>,
    attach_attempts: usize,
    create_attempts: usize,
    quit_calls: usize,
}

#[derive(Clone, Debug, Default)]
struct DocumentState {
    sets: Vec<SetState>,
    open: bool,
    saves: usize,
    closed_discarding: bool,
}

#[derive(Clone, Debug, Default)]
struct SetState {
    name: String,
    entries: Vec<(String, String)>,
}

/// Point-in-time view of one simulated document, for assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub open: bool,
    pub saves: usize,
    pub closed_discarding: bool,
}

/// Scriptable stand-in for the external application.
#[derive(Clone, Default)]
pub struct SimEngineProvider {
    state: Arc<Mutex<SimState>>,
}

impl SimEngineProvider {
    /// Provider with no running instance: attach fails, create succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that already has a running instance to attach to.
    pub fn with_running_instance() -> Self {
        let provider = Self::default();
        provider.state.lock().attach_available = true;
        provider
    }

    /// Registers a document whose custom property set exists but is empty.
    pub fn seed_document(&self, path: impl AsRef<Path>) {
        self.seed_with_sets(
            path,
            vec![SetState {
                name: CUSTOM_PROPERTY_SET.to_string(),
                entries: Vec::new(),
            }],
        );
    }

    /// Registers a document that lacks the user-defined property set.
    pub fn seed_document_without_custom_set(&self, path: impl AsRef<Path>) {
        self.seed_with_sets(
            path,
            vec![SetState {
                name: "Design Tracking Properties".to_string(),
                entries: Vec::new(),
            }],
        );
    }

    fn seed_with_sets(&self, path: impl AsRef<Path>, sets: Vec<SetState>) {
        self.state.lock().documents.insert(
            path.as_ref().to_path_buf(),
            DocumentState {
                sets,
                ..DocumentState::default()
            },
        );
    }

    /// Pre-populates an entry in the custom set of a seeded document.
    pub fn seed_entry(&self, path: impl AsRef<Path>, name: &str, value: &str) {
        let mut state = self.state.lock();
        let document = state
            .documents
            .get_mut(path.as_ref())
            .expect("seed_entry on unseeded document");
        let set = document
            .sets
            .iter_mut()
            .find(|set| set.name == CUSTOM_PROPERTY_SET)
            .expect("seeded document has no custom set");
        set.entries.push((name.to_string(), value.to_string()));
    }

    pub fn fail_create(&self) {
        self.state.lock().fail_create = true;
    }

    pub fn fail_save(&self) {
        self.state.lock().fail_save = true;
    }

    /// Makes every update or add of the named field fault.
    pub fn fail_field(&self, name: &str) {
        self.state.lock().failing_fields.push(name.to_string());
    }

    pub fn attach_attempts(&self) -> usize {
        self.state.lock().attach_attempts
    }

    pub fn create_attempts(&self) -> usize {
        self.state.lock().create_attempts
    }

    pub fn quit_calls(&self) -> usize {
        self.state.lock().quit_calls
    }

    /// Entries of the custom property set, in insertion order.
    pub fn entries(&self, path: impl AsRef<Path>) -> Vec<(String, String)> {
        let state = self.state.lock();
        state
            .documents
            .get(path.as_ref())
            .and_then(|document| {
                document
                    .sets
                    .iter()
                    .find(|set| set.name == CUSTOM_PROPERTY_SET)
            })
            .map(|set| set.entries.clone())
            .unwrap_or_default()
    }

    pub fn document(&self, path: impl AsRef<Path>) -> Option<DocumentSnapshot> {
        let state = self.state.lock();
        state.documents.get(path.as_ref()).map(|document| DocumentSnapshot {
            open: document.open,
            saves: document.saves,
            closed_discarding: document.closed_discarding,
        })
    }
}

impl EngineProvider for SimEngineProvider {
    type Engine = SimEngine;

    fn attach_existing(&self) -> Result<SimEngine, EngineFault> {
        let mut state = self.state.lock();
        state.attach_attempts += 1;
        if state.attach_available {
            Ok(SimEngine {
                state: Arc::clone(&self.state),
            })
        } else {
            Err(EngineFault::new("no running instance"))
        }
    }

    fn create_hidden(&self) -> Result<SimEngine, EngineFault> {
        let mut state = self.state.lock();
        state.create_attempts += 1;
        if state.fail_create {
            Err(EngineFault::new("application could not be started"))
        } else {
            Ok(SimEngine {
                state: Arc::clone(&self.state),
            })
        }
    }
}

pub struct SimEngine {
    state: Arc<Mutex<SimState>>,
}

impl AutomationEngine for SimEngine {
    type Document = SimDocument;

    fn open(&self, path: &Path, _activate: bool) -> Result<SimDocument, EngineFault> {
        let mut state = self.state.lock();
        let document = state
            .documents
            .get_mut(path)
            .ok_or_else(|| EngineFault::new(format!("cannot open {}", path.display())))?;
        document.open = true;
        Ok(SimDocument {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
        })
    }

    fn quit(&self) -> Result<(), EngineFault> {
        self.state.lock().quit_calls += 1;
        Ok(())
    }
}

pub struct SimDocument {
    state: Arc<Mutex<SimState>>,
    path: PathBuf,
}

impl SimDocument {
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut SimState, &mut DocumentState) -> Result<T, EngineFault>,
    ) -> Result<T, EngineFault> {
        let mut state = self.state.lock();
        let mut document = state
            .documents
            .get(&self.path)
            .cloned()
            .ok_or_else(|| EngineFault::new("document vanished"))?;
        let result = f(&mut state, &mut document)?;
        state.documents.insert(self.path.clone(), document);
        Ok(result)
    }
}

impl EngineDocument for SimDocument {
    type Properties = SimPropertySet;

    fn property_sets(&self) -> Result<Vec<SimPropertySet>, EngineFault> {
        let state = self.state.lock();
        let document = state
            .documents
            .get(&self.path)
            .ok_or_else(|| EngineFault::new("document vanished"))?;
        Ok((0..document.sets.len())
            .map(|index| SimPropertySet {
                state: Arc::clone(&self.state),
                path: self.path.clone(),
                index,
            })
            .collect())
    }

    fn save(&self) -> Result<(), EngineFault> {
        self.with_state(|state, document| {
            if state.fail_save {
                return Err(EngineFault::new("save rejected by application"));
            }
            document.saves += 1;
            Ok(())
        })
    }

    fn close(self, discard_changes: bool) -> Result<(), EngineFault> {
        self.with_state(|_, document| {
            document.open = false;
            document.closed_discarding = discard_changes;
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct SimPropertySet {
    state: Arc<Mutex<SimState>>,
    path: PathBuf,
    index: usize,
}

impl SimPropertySet {
    fn with_set<T>(
        &self,
        f: impl FnOnce(&SimState, &mut SetState) -> Result<T, EngineFault>,
    ) -> Result<T, EngineFault> {
        let mut state = self.state.lock();
        let mut document = state
            .documents
            .get(&self.path)
            .cloned()
            .ok_or_else(|| EngineFault::new("document vanished"))?;
        let set = document
            .sets
            .get_mut(self.index)
            .ok_or_else(|| EngineFault::new("property set vanished"))?;
        let result = f(&state, set)?;
        state.documents.insert(self.path.clone(), document);
        Ok(result)
    }
}

impl PropertySet for SimPropertySet {
    fn name(&self) -> Result<String, EngineFault> {
        self.with_set(|_, set| Ok(set.name.clone()))
    }

    fn entry_names(&self) -> Result<Vec<String>, EngineFault> {
        self.with_set(|_, set| Ok(set.entries.iter().map(|(name, _)| name.clone()).collect()))
    }

    fn set_value(&self, name: &str, value: &str) -> Result<(), EngineFault> {
        self.with_set(|state, set| {
            if state.failing_fields.iter().any(|field| field == name) {
                return Err(EngineFault::new(format!("update of '{name}' rejected")));
            }
            let entry = set
                .entries
                .iter_mut()
                .find(|(existing, _)| existing == name)
                .ok_or_else(|| EngineFault::new(format!("no entry named '{name}'")))?;
            entry.1 = value.to_string();
            Ok(())
        })
    }

    fn add(&self, value: &str, name: &str) -> Result<(), EngineFault> {
        self.with_set(|state, set| {
            if state.failing_fields.iter().any(|field| field == name) {
                return Err(EngineFault::new(format!("creation of '{name}' rejected")));
            }
            set.entries.push((name.to_string(), value.to_string()));
            Ok(())
        })
    }
}
