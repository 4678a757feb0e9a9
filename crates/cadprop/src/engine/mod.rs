//! Narrow, statically-typed seam over the external automation engine.
//!
//! The real application is driven through a late-bound object model where
//! member names resolve at call time; every mismatch surfaces as a generic
//! runtime fault. These traits confine that looseness to the adapters so the
//! connection and workflow code stays statically checked.

use std::path::Path;

use thiserror::Error;

#[cfg(windows)]
pub mod com;
pub mod sim;

/// Opaque fault raised by the late-bound automation interface.
///
/// A renamed member, an absent collection, or a wrong type all collapse into
/// this one shape; callers are expected to catch it broadly, log, and move on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineFault(String);

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Hands out engine instances, preferring attachment over process creation.
pub trait EngineProvider: Send + Sync + 'static {
    type Engine: AutomationEngine;

    /// Attaches to an already-running instance of the external application.
    fn attach_existing(&self) -> Result<Self::Engine, EngineFault>;

    /// Starts a fresh instance in non-interactive, invisible mode.
    fn create_hidden(&self) -> Result<Self::Engine, EngineFault>;
}

/// One connected instance of the external application.
pub trait AutomationEngine: Send + Sync + 'static {
    type Document: EngineDocument;

    /// Opens a document, optionally activating it in the application window.
    /// The write workflow always opens in the background (`activate = false`).
    fn open(&self, path: &Path, activate: bool) -> Result<Self::Document, EngineFault>;

    /// Asks the application to exit. Only meaningful for spawned instances.
    fn quit(&self) -> Result<(), EngineFault>;
}

/// One open document, exclusively owned by a single workflow invocation.
pub trait EngineDocument {
    type Properties: PropertySet;

    /// All property collections the document exposes, in engine order.
    fn property_sets(&self) -> Result<Vec<Self::Properties>, EngineFault>;

    fn save(&self) -> Result<(), EngineFault>;

    /// Closes the document, discarding unsaved changes when asked to.
    /// Consumes the handle so a double close cannot compile.
    fn close(self, discard_changes: bool) -> Result<(), EngineFault>;
}

/// A named collection of (name, value) property entries on an open document.
pub trait PropertySet {
    fn name(&self) -> Result<String, EngineFault>;

    fn entry_names(&self) -> Result<Vec<String>, EngineFault>;

    /// Overwrites the value of an existing entry in place.
    fn set_value(&self, name: &str, value: &str) -> Result<(), EngineFault>;

    /// Appends a new entry. The engine's argument order is value first.
    fn add(&self, value: &str, name: &str) -> Result<(), EngineFault>;
}
