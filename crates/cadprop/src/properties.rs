use std::fmt;

use tracing::{debug, warn};

use crate::engine::{EngineDocument, EngineFault, PropertySet};
use crate::error::CadpropError;

/// Name of the property collection holding user-defined custom fields.
pub const CUSTOM_PROPERTY_SET: &str = "Inventor User Defined Properties";

/// The three custom fields the writer manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldName {
    Project,
    Reference,
    Module,
}

impl FieldName {
    pub const ALL: [FieldName; 3] = [FieldName::Project, FieldName::Reference, FieldName::Module];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Project => "Project",
            FieldName::Reference => "Reference",
            FieldName::Module => "Module",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field result of an upsert attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldStatus {
    /// An existing entry was overwritten in place.
    Updated,
    /// No entry with that name existed; a new one was appended.
    Created,
    /// No value was supplied for the field.
    Skipped,
    /// The engine rejected the write. Sibling fields are unaffected.
    Failed(String),
}

impl FieldStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, FieldStatus::Updated | FieldStatus::Created)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldOutcome {
    pub name: FieldName,
    pub status: FieldStatus,
}

/// Locates the user-defined custom property collection on an open document.
///
/// Absence is a hard structural mismatch; the collection is never created
/// here.
pub fn resolve_custom_properties<D: EngineDocument>(
    document: &D,
) -> Result<D::Properties, CadpropError> {
    for set in document.property_sets()? {
        if set.name()? == CUSTOM_PROPERTY_SET {
            return Ok(set);
        }
    }
    Err(CadpropError::Structure(format!(
        "property set '{CUSTOM_PROPERTY_SET}' not found"
    )))
}

/// Update-if-present-else-insert for one named entry.
///
/// Faults are absorbed into the returned status so that one bad field never
/// aborts its siblings. Matching is a case-sensitive exact comparison, and a
/// duplicate created outside this tool is left alone: only the first match is
/// touched.
pub fn upsert<S: PropertySet>(set: &S, field: FieldName, value: &str) -> FieldStatus {
    match try_upsert(set, field, value) {
        Ok(status) => {
            debug!(field = %field, value, outcome = ?status, "custom property written");
            status
        }
        Err(fault) => {
            warn!(field = %field, %fault, "custom property write failed");
            FieldStatus::Failed(fault.to_string())
        }
    }
}

fn try_upsert<S: PropertySet>(
    set: &S,
    field: FieldName,
    value: &str,
) -> Result<FieldStatus, EngineFault> {
    let target = field.as_str();
    if set.entry_names()?.iter().any(|name| name == target) {
        set.set_value(target, value)?;
        return Ok(FieldStatus::Updated);
    }
    set.add(value, target)?;
    Ok(FieldStatus::Created)
}
