use analyst_file_loader::load;
use std::io::Write;

fn temp_with_ext(contents: &str, ext: &str) -> tempfile::TempPath {
    let mut f = tempfile::Builder::new()
        .suffix(&format!(".{ext}"))
        .tempfile()
        .unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f.into_temp_path()
}

/// The same table, expressed as CSV, TSV, and a JSON array of objects,
/// should come back with matching columns, row count, and column types.
#[test]
fn same_table_across_formats_agrees_on_shape() {
    let csv = temp_with_ext("units,price\n10,9.99\n20,14.5\n", "csv");
    let tsv = temp_with_ext("units\tprice\n10\t9.99\n20\t14.5\n", "tsv");
    let json = temp_with_ext(
        r#"[{"units": 10, "price": 9.99}, {"units": 20, "price": 14.5}]"#,
        "json",
    );

    let csv_frame = load(&csv, 1_000_000).unwrap();
    let tsv_frame = load(&tsv, 1_000_000).unwrap();
    let json_frame = load(&json, 1_000_000).unwrap();

    assert_eq!(csv_frame.columns, tsv_frame.columns);
    assert_eq!(csv_frame.columns, json_frame.columns);
    assert_eq!(csv_frame.row_count(), tsv_frame.row_count());
    assert_eq!(csv_frame.row_count(), json_frame.row_count());
    assert_eq!(csv_frame.column_types, tsv_frame.column_types);
    assert_eq!(csv_frame.column_types, json_frame.column_types);
}

/// A `.txt` file with a consistent delimiter should load identically to the
/// same content saved as `.csv`.
#[test]
fn txt_with_consistent_delimiter_matches_csv() {
    let csv = temp_with_ext("name,age\nava,30\nben,41\n", "csv");
    let txt = temp_with_ext("name,age\nava,30\nben,41\n", "txt");

    let csv_frame = load(&csv, 1_000_000).unwrap();
    let txt_frame = load(&txt, 1_000_000).unwrap();

    assert_eq!(csv_frame.columns, txt_frame.columns);
    assert_eq!(csv_frame.row_count(), txt_frame.row_count());
}

/// Files over the configured byte ceiling are rejected before any parser
/// runs, regardless of format.
#[test]
fn oversized_files_are_rejected_for_every_format() {
    let csv = temp_with_ext("a,b\n1,2\n3,4\n5,6\n7,8\n", "csv");
    let json = temp_with_ext(r#"[{"a": 1}, {"a": 2}, {"a": 3}]"#, "json");

    assert!(load(&csv, 2).is_err());
    assert!(load(&json, 2).is_err());
}
