mod common;

use common::{build_docx, docx, paragraph, tokens};
use docfill::entity::{classify, Entity};
use docfill::placeholders::extract_placeholders;
use docfill::EngineError;

#[test]
fn duplicates_collapse_in_first_appearance_order() {
    let pkg = docx(&[
        paragraph(&["{a.b} hello {a.b} world {c.d}"]),
        paragraph(&["again {c.d} then {e.f}"]),
    ]);
    assert_eq!(
        extract_placeholders(&pkg).unwrap(),
        tokens(&["{a.b}", "{c.d}", "{e.f}"])
    );
}

#[test]
fn tokens_split_across_runs_are_found() {
    let pkg = docx(&[paragraph(&["Dear {cust", "omer.na", "me},"])]);
    assert_eq!(extract_placeholders(&pkg).unwrap(), tokens(&["{customer.name}"]));
}

#[test]
fn paragraphs_never_join_into_one_token() {
    let pkg = docx(&[paragraph(&["{a."]), paragraph(&["b}"])]);
    assert!(extract_placeholders(&pkg).unwrap().is_empty());
}

#[test]
fn table_cells_are_scanned() {
    let body = format!(
        "<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
        paragraph(&["{customer.company}"]),
        paragraph(&["{performer.company}"])
    );
    let pkg = build_docx(&body, &[]);
    let found = extract_placeholders(&pkg).unwrap();
    assert_eq!(found, tokens(&["{customer.company}", "{performer.company}"]));
    assert_eq!(classify(&found, Entity::Performer), tokens(&["{performer.company}"]));
}

#[test]
fn document_without_placeholders_yields_empty_list() {
    let pkg = docx(&[paragraph(&["Nothing to fill here."])]);
    assert!(extract_placeholders(&pkg).unwrap().is_empty());
}

#[test]
fn invalid_packages_are_package_read_errors() {
    let err = extract_placeholders(b"definitely not a zip").unwrap_err();
    assert!(matches!(err, EngineError::PackageRead(_)), "{err}");

    let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    w.start_file("docProps/app.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    let no_body = w.finish().unwrap().into_inner();
    let err = extract_placeholders(&no_body).unwrap_err();
    assert_eq!(err.kind(), "package_read");
}

#[test]
fn body_part_without_body_element_is_a_processing_error() {
    let pkg = {
        use std::io::Write;
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        w.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        w.write_all(b"<w:document xmlns:w=\"urn:w\"/>").unwrap();
        w.finish().unwrap().into_inner()
    };
    let err = extract_placeholders(&pkg).unwrap_err();
    assert!(matches!(err, EngineError::Processing(_)), "{err}");
}
