use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::connection::EngineConnection;
use crate::engine::{AutomationEngine, EngineDocument, EngineProvider};
use crate::error::CadpropError;
use crate::properties::{self, FieldName, FieldOutcome, FieldStatus};
use crate::readonly::ReadOnlyGuard;

/// File extensions the engine can open, lowercase and without the dot.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["ipt", "iam", "idw", "ipn"];

/// Values for the three managed custom fields. `None` or empty means skip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldValues {
    pub project: Option<String>,
    pub reference: Option<String>,
    pub module: Option<String>,
}

impl FieldValues {
    fn get(&self, field: FieldName) -> Option<&str> {
        let value = match field {
            FieldName::Project => &self.project,
            FieldName::Reference => &self.reference,
            FieldName::Module => &self.module,
        };
        value.as_deref().filter(|value| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        FieldName::ALL.iter().all(|field| self.get(*field).is_none())
    }
}

/// Outcome of one `write` invocation: overall success plus the per-field
/// result list, so partial success stays observable to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteReport {
    pub success: bool,
    pub fields: Vec<FieldOutcome>,
}

impl WriteReport {
    fn failed() -> Self {
        Self {
            success: false,
            fields: Vec::new(),
        }
    }

    /// Number of fields actually written (updated or created).
    pub fn written(&self) -> usize {
        self.fields
            .iter()
            .filter(|outcome| outcome.status.is_written())
            .count()
    }
}

/// Per-file orchestration: validate, connect, open, upsert, save, close,
/// restore attributes. One instance can serve many sequential files; the
/// engine handle is shared and acquired once.
pub struct DocumentWriter<P: EngineProvider> {
    connection: Arc<EngineConnection<P>>,
}

impl<P: EngineProvider> DocumentWriter<P> {
    pub fn new(connection: Arc<EngineConnection<P>>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &EngineConnection<P> {
        &self.connection
    }

    /// Writes the given custom fields into the document at `path`.
    ///
    /// Never panics and never returns an error: every failure category is
    /// absorbed here and reported through `WriteReport::success`, so a caller
    /// sweeping many files is not aborted by one bad document. No retries;
    /// retry policy belongs to the caller.
    pub fn write(&self, path: &Path, fields: &FieldValues) -> WriteReport {
        if let Err(reason) = validate_path(path) {
            warn!(path = %path.display(), %reason, "file skipped");
            return WriteReport::failed();
        }

        if !self.connection.ensure_ready() {
            error!(path = %path.display(), "no engine connection, file not written");
            return WriteReport::failed();
        }
        let Some(engine) = self.connection.engine() else {
            error!(path = %path.display(), "engine handle disposed concurrently");
            return WriteReport::failed();
        };

        // Attribute restoration is scoped to the whole open-to-close
        // sequence: the guard's Drop runs on the fault path too.
        let guard = match ReadOnlyGuard::acquire(path) {
            Ok(guard) => guard,
            Err(err) => {
                error!(path = %path.display(), %err, "cannot adjust read-only attribute");
                return WriteReport::failed();
            }
        };

        let result = Self::write_document(engine.as_ref(), path, fields);
        drop(guard);

        match result {
            Ok(outcomes) => {
                let report = WriteReport {
                    success: true,
                    fields: outcomes,
                };
                info!(
                    path = %path.display(),
                    written = report.written(),
                    "custom properties saved"
                );
                report
            }
            Err(err) => {
                error!(path = %path.display(), %err, "write failed");
                WriteReport::failed()
            }
        }
    }

    fn write_document(
        engine: &P::Engine,
        path: &Path,
        fields: &FieldValues,
    ) -> Result<Vec<FieldOutcome>, CadpropError> {
        debug!(path = %path.display(), "opening document in background");
        let document = engine.open(path, false)?;

        match Self::apply_fields(&document, fields) {
            Ok(outcomes) => {
                document.close(false)?;
                Ok(outcomes)
            }
            Err(err) => {
                // Best-effort close that discards unsaved changes; the
                // original fault is the one worth reporting.
                if let Err(close_fault) = document.close(true) {
                    warn!(path = %path.display(), %close_fault, "discard-close failed");
                }
                Err(err)
            }
        }
    }

    fn apply_fields(
        document: &<P::Engine as AutomationEngine>::Document,
        fields: &FieldValues,
    ) -> Result<Vec<FieldOutcome>, CadpropError> {
        let custom = properties::resolve_custom_properties(document)?;

        let mut outcomes = Vec::with_capacity(FieldName::ALL.len());
        for field in FieldName::ALL {
            let status = match fields.get(field) {
                Some(value) => properties::upsert(&custom, field, value),
                None => FieldStatus::Skipped,
            };
            outcomes.push(FieldOutcome {
                name: field,
                status,
            });
        }

        document.save()?;
        Ok(outcomes)
    }
}

fn validate_path(path: &Path) -> Result<(), CadpropError> {
    if !path.is_file() {
        return Err(CadpropError::Validation(format!(
            "no such file: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(CadpropError::Validation(format!(
            "unsupported extension '.{extension}'"
        )));
    }

    Ok(())
}
