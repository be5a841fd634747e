use analyst_core::{DataFile, FileFormat};
use analyst_schema::{group_by_concept, render_normalization_guide, SchemaInspector};
use chrono::Utc;
use std::io::Write;

fn write_csv(dir: &std::path::Path, name: &str, contents: &str) -> DataFile {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    DataFile {
        name: name.to_string(),
        size: contents.len() as u64,
        mtime: Utc::now(),
        format: FileFormat::from_extension("csv"),
    }
}

/// Two files with columns `Ticket_Cost` and `revenue` both map to the
/// `price` concept; the normalization guide lists both under one group.
#[test]
fn cross_file_columns_group_under_shared_concept() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_csv(dir.path(), "venueA.csv", "Ticket_Cost,Event\n9.99,opener\n14.5,encore\n");
    let b = write_csv(dir.path(), "venueB.csv", "revenue,Event\n100.0,matinee\n200.0,evening\n");

    let inspector = SchemaInspector::new(5, 1_000_000);
    let schemas = inspector.inspect_all(dir.path(), &[a, b]);
    assert_eq!(schemas.len(), 2);

    let groups = group_by_concept(&schemas);
    let price_group = groups.get("price").expect("price concept group present");
    assert!(price_group.contains(&"venueA.csv:Ticket_Cost".to_string()));
    assert!(price_group.contains(&"venueB.csv:revenue".to_string()));

    let guide = render_normalization_guide(&schemas);
    assert!(guide.contains("price:"));
    assert!(guide.contains("venueA.csv:Ticket_Cost"));
    assert!(guide.contains("venueB.csv:revenue"));
}
