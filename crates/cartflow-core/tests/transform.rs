use std::collections::HashSet;
use std::fs;
use std::path::Path;

use cartflow_core::error::PipelineError;
use cartflow_core::table::RecordTable;
use cartflow_core::transform::{
    transform_directory, FailurePolicy, TransformOptions, TransformReport,
};
use tempfile::TempDir;

fn write_raw(dir: &Path, name: &str, contents: &str) {
    fs::create_dir_all(dir).expect("create raw dir");
    fs::write(dir.join(name), contents).expect("write raw file");
}

fn read_clean(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).expect("read cleaned file")
}

fn run(raw: &Path, cleaned: &Path) -> TransformReport {
    transform_directory(raw, cleaned, &TransformOptions::default()).expect("transform")
}

struct Dirs {
    _root: TempDir,
    raw: std::path::PathBuf,
    cleaned: std::path::PathBuf,
}

fn dirs() -> Dirs {
    let root = tempfile::tempdir().expect("tempdir");
    let raw = root.path().join("extract/data");
    let cleaned = root.path().join("transform/cleaned");
    fs::create_dir_all(&raw).expect("raw dir");
    Dirs {
        _root: root,
        raw,
        cleaned,
    }
}

#[test]
fn header_is_normalized() {
    let d = dirs();
    write_raw(&d.raw, "products.csv", "Product Name,SKU#,  Price \nMug,M-1,9.5\n");

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.count(), 1);
    assert_eq!(
        read_clean(&d.cleaned, "products_clean.csv"),
        "product_name,sku,price\nMug,M-1,9.5\n"
    );
}

#[test]
fn duplicate_and_all_null_rows_are_removed() {
    let d = dirs();
    write_raw(&d.raw, "carts.csv", "name,qty\nA,1\nA,1\n,\n");

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(read_clean(&d.cleaned, "carts_clean.csv"), "name,qty\nA,1\n");
    assert_eq!(report.processed[0].rows_in, 3);
    assert_eq!(report.processed[0].rows_out, 1);
}

#[test]
fn surviving_rows_keep_their_relative_order() {
    let d = dirs();
    write_raw(&d.raw, "users.csv", "id,name\n3,c\n1,a\n3,c\n,\n2,b\n1,a\n");

    run(&d.raw, &d.cleaned);

    assert_eq!(
        read_clean(&d.cleaned, "users_clean.csv"),
        "id,name\n3,c\n1,a\n2,b\n"
    );
}

#[test]
fn empty_raw_directory_produces_nothing() {
    let d = dirs();

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.count(), 0);
    assert!(report.failures.is_empty());
    assert!(d.cleaned.is_dir(), "destination is created even when empty");
    assert_eq!(fs::read_dir(&d.cleaned).unwrap().count(), 0);
}

#[test]
fn colliding_columns_keep_the_later_values() {
    let d = dirs();
    write_raw(&d.raw, "products.csv", "Price $,Title,Price %\n1,mug,10\n2,cup,20\n");

    let report = run(&d.raw, &d.cleaned);

    let cleaned = read_clean(&d.cleaned, "products_clean.csv");
    // the space becomes `_` before `$` and `%` are deleted
    assert_eq!(cleaned, "price_,title\n10,mug\n20,cup\n");

    let table = RecordTable::from_reader(cleaned.as_bytes()).expect("parse output");
    assert_eq!(
        table.column_values("price_"),
        Some(vec![Some("10"), Some("20")])
    );

    let collisions = &report.processed[0].collisions;
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].name, "price_");
    assert_eq!(collisions[0].replaced_index, 0);
    assert_eq!(collisions[0].kept_index, 2);
}

#[test]
fn header_only_input_yields_header_only_output() {
    let d = dirs();
    write_raw(&d.raw, "users.csv", "ID,First Name\n");

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.processed[0].rows_out, 0);
    assert_eq!(read_clean(&d.cleaned, "users_clean.csv"), "id,first_name\n");
}

#[test]
fn second_run_is_byte_identical() {
    let d = dirs();
    write_raw(
        &d.raw,
        "users.csv",
        "Name First,Address.City,Phone\njohn,\"kilcoole, ie\",1-570\njohn,\"kilcoole, ie\",1-570\n",
    );
    write_raw(&d.raw, "carts.csv", "id,products\n1,\"[{\"\"productId\"\":1}]\"\n");

    let first = run(&d.raw, &d.cleaned);
    let first_bytes = fs::read(d.cleaned.join("users_clean.csv")).unwrap();
    let second = run(&d.raw, &d.cleaned);
    let second_bytes = fs::read(d.cleaned.join("users_clean.csv")).unwrap();

    assert_eq!(first_bytes, second_bytes);
    let hashes = |report: &TransformReport| -> Vec<String> {
        report.processed.iter().map(|f| f.hash.clone()).collect()
    };
    assert_eq!(hashes(&first), hashes(&second));
}

#[test]
fn non_csv_files_are_skipped() {
    let d = dirs();
    write_raw(&d.raw, "users.csv", "id\n1\n");
    write_raw(&d.raw, "README.md", "# notes\n");
    write_raw(&d.raw, "products.json", "[]");

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(
        report.name_pairs(),
        vec![("users.csv".to_string(), "users_clean.csv".to_string())]
    );
    assert_eq!(report.skipped, vec!["README.md", "products.json"]);
    assert!(report.failures.is_empty());
}

#[test]
fn malformed_file_is_reported_and_the_rest_continue() {
    let d = dirs();
    write_raw(&d.raw, "a_empty.csv", "");
    write_raw(&d.raw, "b_ragged.csv", "x,y\n1,2,3\n");
    write_raw(&d.raw, "c_users.csv", "id\n1\n");

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.count(), 1);
    assert_eq!(report.processed[0].output, "c_users_clean.csv");
    let failed: Vec<&str> = report.failures.iter().map(|f| f.input.as_str()).collect();
    assert_eq!(failed, vec!["a_empty.csv", "b_ragged.csv"]);
    assert!(!d.cleaned.join("a_empty_clean.csv").exists());

    let err = report.into_result().expect_err("failures surface as an error");
    assert!(matches!(err, PipelineError::Transform { failed: 2, .. }));
}

#[test]
fn abort_policy_stops_at_the_first_malformed_file() {
    let d = dirs();
    write_raw(&d.raw, "a_users.csv", "id\n1\n");
    write_raw(&d.raw, "b_empty.csv", "");
    write_raw(&d.raw, "c_carts.csv", "id\n2\n");

    let options = TransformOptions {
        failure_policy: FailurePolicy::Abort,
        ..TransformOptions::default()
    };
    let err = transform_directory(&d.raw, &d.cleaned, &options).expect_err("aborts");

    assert!(matches!(err, PipelineError::MalformedInput { .. }));
    assert!(d.cleaned.join("a_users_clean.csv").exists(), "earlier output stays");
    assert!(!d.cleaned.join("c_carts_clean.csv").exists());
}

#[test]
fn custom_suffix_changes_output_names() {
    let d = dirs();
    write_raw(&d.raw, "users.csv", "id\n1\n");

    let options = TransformOptions {
        suffix: "_v2".into(),
        ..TransformOptions::default()
    };
    let report = transform_directory(&d.raw, &d.cleaned, &options).expect("transform");

    assert_eq!(report.processed[0].output, "users_v2.csv");
}

#[test]
fn cleaned_output_upholds_table_invariants() {
    let d = dirs();
    write_raw(
        &d.raw,
        "messy.csv",
        concat!(
            " ID ,User\tName,E-Mail Address,Rating (avg),rating.count,  \n",
            "1,ann,a@x.io,4.1,10,\n",
            ",,,,,\n",
            "2,bob,,3.9,,\n",
            "1,ann,a@x.io,4.1,10,\n",
            ",,,,,\n",
            "3,,,,,x\n",
        ),
    );

    run(&d.raw, &d.cleaned);
    let output = fs::read(d.cleaned.join("messy_clean.csv")).unwrap();
    let table = RecordTable::from_reader(output.as_slice()).expect("parse output");

    for name in &table.columns {
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
            "column {name:?} contains characters outside [a-z0-9_]"
        );
    }
    assert_eq!(
        table.columns,
        vec!["id", "username", "email_address", "rating_avg", "ratingcount", ""]
    );

    assert!(table.height() <= 6);
    let unique: HashSet<_> = table.rows.iter().collect();
    assert_eq!(unique.len(), table.height(), "no duplicate rows");
    assert!(table.rows.iter().all(|row| row.iter().any(Option::is_some)));
    assert_eq!(table.height(), 3);
}

#[test]
fn outputs_of_removed_inputs_are_deleted() {
    let d = dirs();
    write_raw(&d.raw, "old.csv", "id\n1\n");
    run(&d.raw, &d.cleaned);
    assert!(d.cleaned.join("old_clean.csv").exists());

    fs::remove_file(d.raw.join("old.csv")).unwrap();
    write_raw(&d.raw, "new.csv", "id\n2\n");
    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.count(), 1);
    assert_eq!(report.removed, vec!["old_clean.csv"]);
    let mut remaining: Vec<String> = fs::read_dir(&d.cleaned)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["new_clean.csv"]);
}

#[test]
fn failed_input_does_not_keep_its_previous_output() {
    let d = dirs();
    write_raw(&d.raw, "users.csv", "id\n1\n");
    run(&d.raw, &d.cleaned);

    write_raw(&d.raw, "users.csv", "id,name\n1\n");
    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.removed, vec!["users_clean.csv"]);
    assert!(!d.cleaned.join("users_clean.csv").exists());
}

#[test]
fn files_not_named_like_outputs_are_left_alone() {
    let d = dirs();
    fs::create_dir_all(&d.cleaned).unwrap();
    fs::write(d.cleaned.join("manual.csv"), "id\n9\n").unwrap();
    fs::write(d.cleaned.join("notes.txt"), "keep").unwrap();
    write_raw(&d.raw, "users.csv", "id\n1\n");

    let report = run(&d.raw, &d.cleaned);

    assert!(report.removed.is_empty());
    assert!(d.cleaned.join("manual.csv").exists());
    assert!(d.cleaned.join("notes.txt").exists());
}

#[test]
fn blank_header_file_is_malformed() {
    let d = dirs();
    write_raw(&d.raw, "carts.csv", "\"\"\n");

    let report = run(&d.raw, &d.cleaned);

    assert_eq!(report.count(), 0);
    assert_eq!(report.failures.len(), 1);
    assert!(!d.cleaned.join("carts_clean.csv").exists());
}
