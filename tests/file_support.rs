//! Multi-format loading: DOCX, HTML, and PDF files flow through the loader
//! into chunks, and unreadable files are skipped without failing the load.

mod common;

use std::fs;
use std::io::Write;
use std::sync::Arc;

use common::{test_config, HashEmbedder};
use rag_helper::chunk::chunk_records;
use rag_helper::config::ChunkingConfig;
use rag_helper::loader::load_documents;
use rag_helper::retriever::LazyRetriever;
use tempfile::TempDir;

/// Minimal PDF with a single text-drawing operator. Offsets in the xref
/// table are computed so the file parses.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn mixed_formats_load_with_file_name_sources() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("reports")).unwrap();
    fs::write(
        data.join("reports").join("quarterly.docx"),
        minimal_docx(&["Revenue grew in the third quarter.", "Costs were flat."]),
    )
    .unwrap();
    fs::write(
        data.join("page.html"),
        "<html><head><style>p { color: red; }</style><script>var x = 1;</script></head>\
         <body><p>Office hours are on Tuesday.</p></body></html>",
    )
    .unwrap();
    fs::write(data.join("notes.txt"), "Plain text notes.").unwrap();

    let records = load_documents(&data, &[]).unwrap();
    let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["notes.txt", "page.html", "quarterly.docx"]);

    let docx = &records[2];
    assert_eq!(
        docx.text,
        "Revenue grew in the third quarter.\n\nCosts were flat."
    );

    let html = &records[1];
    assert!(html.text.contains("Office hours are on Tuesday."));
    assert!(!html.text.contains("color"));
    assert!(!html.text.contains("var x"));
    assert!(!html.text.contains('<'));
}

#[test]
fn unreadable_files_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("broken.pdf"), b"not a valid pdf").unwrap();
    fs::write(data.join("broken.docx"), b"not a zip archive").unwrap();
    fs::write(data.join("good.md"), "# Title\n\nStill loaded.").unwrap();

    let records = load_documents(&data, &[]).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "good.md");
}

#[test]
fn pdf_text_is_loaded() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("manual.pdf"), minimal_pdf("pdf test phrase")).unwrap();
    fs::write(data.join("readme.txt"), "Read me first.").unwrap();

    let records = load_documents(&data, &[]).unwrap();
    let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["manual.pdf", "readme.txt"]);
    assert!(
        records[0].text.contains("pdf test phrase"),
        "pdf text: {:?}",
        records[0].text
    );
}

#[test]
fn excluded_globs_are_not_loaded() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("drafts")).unwrap();
    fs::write(data.join("final.txt"), "Final text.").unwrap();
    fs::write(data.join("drafts").join("wip.txt"), "Work in progress.").unwrap();

    let records = load_documents(&data, &["drafts/**".to_string()]).unwrap();
    let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["final.txt"]);
}

#[test]
fn long_document_chunks_keep_source_and_order() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    let paragraph = "word ".repeat(150);
    let text = vec![paragraph.trim(); 6].join("\n\n");
    fs::write(data.join("long.txt"), &text).unwrap();

    let records = load_documents(&data, &[]).unwrap();
    let chunks = chunk_records(&records, &ChunkingConfig::default());
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.source, "long.txt");
        assert_eq!(chunk.chunk_index, i as i64);
        assert!(chunk.text.chars().count() <= 1000);
    }
}

#[tokio::test]
async fn docx_content_is_retrievable() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    fs::create_dir_all(&config.paths.data_dir).unwrap();
    fs::write(
        config.paths.data_dir.join("policy.docx"),
        minimal_docx(&["Rotate the signing keys every ninety days."]),
    )
    .unwrap();
    fs::write(
        config.paths.data_dir.join("menu.txt"),
        "Soup and salad are served at noon.",
    )
    .unwrap();

    let lazy = LazyRetriever::new(config, Arc::new(HashEmbedder::new()));
    let chunks = lazy.query("how often to rotate signing keys").await.unwrap();
    assert_eq!(chunks[0].source, "policy.docx");
    assert_eq!(chunks[0].text, "Rotate the signing keys every ninety days.");
}
