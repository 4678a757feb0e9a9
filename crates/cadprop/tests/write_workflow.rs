use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadprop::{
    DocumentWriter, EngineConnection, FieldName, FieldStatus, FieldValues, SimEngineProvider,
};

fn writer_for(provider: &SimEngineProvider) -> DocumentWriter<SimEngineProvider> {
    DocumentWriter::new(Arc::new(EngineConnection::new(provider.clone())))
}

/// Creates a real file on disk and registers it with the simulated engine.
fn seeded_file(dir: &Path, name: &str, provider: &SimEngineProvider) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"stub document").unwrap();
    provider.seed_document(&path);
    path
}

fn fields(project: Option<&str>, reference: Option<&str>, module: Option<&str>) -> FieldValues {
    FieldValues {
        project: project.map(str::to_string),
        reference: reference.map(str::to_string),
        module: module.map(str::to_string),
    }
}

fn set_read_only(path: &Path, value: bool) {
    let mut permissions = fs::metadata(path).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(value);
    fs::set_permissions(path, permissions).unwrap();
}

#[test]
fn writes_fields_on_fresh_document() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let path = seeded_file(dir.path(), "part.ipt", &provider);
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), None, Some("M7")));

    assert!(report.success);
    assert_eq!(report.written(), 2);
    assert_eq!(
        provider.entries(&path),
        vec![
            ("Project".to_string(), "P100".to_string()),
            ("Module".to_string(), "M7".to_string()),
        ]
    );

    let reference = report
        .fields
        .iter()
        .find(|outcome| outcome.name == FieldName::Reference)
        .unwrap();
    assert_eq!(reference.status, FieldStatus::Skipped);

    let snapshot = provider.document(&path).unwrap();
    assert!(!snapshot.open);
    assert!(!snapshot.closed_discarding);
    assert_eq!(snapshot.saves, 1);
}

#[test]
fn writing_twice_keeps_one_entry_per_field() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let path = seeded_file(dir.path(), "frame.iam", &provider);
    let writer = writer_for(&provider);

    assert!(writer.write(&path, &fields(Some("P100"), Some("R1"), None)).success);
    assert!(writer.write(&path, &fields(Some("P200"), Some("R1"), None)).success);

    assert_eq!(
        provider.entries(&path),
        vec![
            ("Project".to_string(), "P200".to_string()),
            ("Reference".to_string(), "R1".to_string()),
        ]
    );
}

#[test]
fn read_only_attribute_survives_a_successful_write() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let path = seeded_file(dir.path(), "layout.idw", &provider);
    set_read_only(&path, true);
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), None, None));

    assert!(report.success);
    assert!(fs::metadata(&path).unwrap().permissions().readonly());
    set_read_only(&path, false);
}

#[test]
fn read_only_attribute_is_restored_on_the_fault_path() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    provider.fail_save();
    let path = seeded_file(dir.path(), "part.ipt", &provider);
    set_read_only(&path, true);
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), None, None));

    assert!(!report.success);
    assert!(fs::metadata(&path).unwrap().permissions().readonly());
    // The document was abandoned without saving.
    let snapshot = provider.document(&path).unwrap();
    assert!(!snapshot.open);
    assert!(snapshot.closed_discarding);
    assert_eq!(snapshot.saves, 0);
    set_read_only(&path, false);
}

#[test]
fn unsupported_extension_never_touches_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let path = dir.path().join("drawing.txt");
    fs::write(&path, b"not a cad file").unwrap();
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), None, None));

    assert!(!report.success);
    assert_eq!(provider.attach_attempts(), 0);
    assert_eq!(provider.create_attempts(), 0);
}

#[test]
fn missing_file_fails_fast() {
    let provider = SimEngineProvider::new();
    let writer = writer_for(&provider);

    let report = writer.write(Path::new("/nonexistent/part.ipt"), &fields(Some("P"), None, None));

    assert!(!report.success);
    assert_eq!(provider.create_attempts(), 0);
}

#[test]
fn missing_custom_set_closes_discarding_changes() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let path = dir.path().join("part.ipt");
    fs::write(&path, b"stub").unwrap();
    provider.seed_document_without_custom_set(&path);
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), None, None));

    assert!(!report.success);
    let snapshot = provider.document(&path).unwrap();
    assert!(!snapshot.open);
    assert!(snapshot.closed_discarding);
    assert_eq!(snapshot.saves, 0);
}

#[test]
fn sequential_writes_share_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let first = seeded_file(dir.path(), "a.ipt", &provider);
    let second = seeded_file(dir.path(), "b.ipn", &provider);
    let writer = writer_for(&provider);

    assert!(writer.write(&first, &fields(Some("P1"), None, None)).success);
    assert!(writer.write(&second, &fields(Some("P1"), None, None)).success);

    assert_eq!(provider.attach_attempts(), 1);
    assert_eq!(provider.create_attempts(), 1);
}

#[test]
fn one_failing_field_does_not_abort_its_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    provider.fail_field("Reference");
    let path = seeded_file(dir.path(), "part.ipt", &provider);
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), Some("R1"), Some("M7")));

    // Per-field failures are reported, not fatal: the document still saves.
    assert!(report.success);
    assert_eq!(report.written(), 2);
    let reference = report
        .fields
        .iter()
        .find(|outcome| outcome.name == FieldName::Reference)
        .unwrap();
    assert!(matches!(reference.status, FieldStatus::Failed(_)));
    assert_eq!(
        provider.entries(&path),
        vec![
            ("Project".to_string(), "P100".to_string()),
            ("Module".to_string(), "M7".to_string()),
        ]
    );
    assert_eq!(provider.document(&path).unwrap().saves, 1);
}

#[test]
fn connection_failure_aborts_before_opening() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    provider.fail_create();
    let path = seeded_file(dir.path(), "part.ipt", &provider);
    let writer = writer_for(&provider);

    let report = writer.write(&path, &fields(Some("P100"), None, None));

    assert!(!report.success);
    let snapshot = provider.document(&path).unwrap();
    assert!(!snapshot.open);
    assert_eq!(snapshot.saves, 0);
}

#[test]
fn dispose_then_write_reacquires_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SimEngineProvider::new();
    let path = seeded_file(dir.path(), "part.ipt", &provider);
    let writer = writer_for(&provider);

    assert!(writer.write(&path, &fields(Some("P1"), None, None)).success);
    writer.connection().dispose();
    assert_eq!(provider.quit_calls(), 1);

    assert!(writer.write(&path, &fields(Some("P2"), None, None)).success);
    assert_eq!(provider.create_attempts(), 2);
}
