//! Fixture helpers shared by `datamorph-core`'s unit and integration tests.
//!
//! Every helper writes a temp file and hands back the [`tempfile::NamedTempFile`]
//! so the caller controls its lifetime; the file is deleted on drop.

use std::io::Write;

use tempfile::NamedTempFile;

/// Writes `contents` to a fresh temp file and returns the handle.
pub fn write_temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp file contents");
    file.flush().expect("failed to flush temp file");
    file
}

/// A small CSV fixture: header + `rows` data rows, three columns (id, name, score).
pub fn csv_fixture(rows: usize) -> NamedTempFile {
    let mut buf = String::from("id,name,score\n");
    for i in 0..rows {
        buf.push_str(&format!("{i},user{i},{:.1}\n", i as f64 * 1.5));
    }
    write_temp_file(&buf)
}

/// CSV with a quoted field containing an embedded comma, newline, and escaped quote.
pub fn csv_with_quoting() -> NamedTempFile {
    write_temp_file(
        "id,name,note\n\
         1,plain,ok\n\
         2,\"quoted, name\",\"line1\nline2\"\n\
         3,\"she said \"\"hi\"\"\",fine\n",
    )
}

/// A small JSON Lines fixture: `rows` independent JSON objects, one per line.
pub fn jsonl_fixture(rows: usize) -> NamedTempFile {
    let mut buf = String::new();
    for i in 0..rows {
        buf.push_str(&format!(
            "{{\"id\":{i},\"name\":\"user{i}\",\"active\":{}}}\n",
            i % 2 == 0
        ));
    }
    write_temp_file(&buf)
}

/// JSON Lines fixture with one malformed line in the middle.
pub fn jsonl_with_malformed_line() -> NamedTempFile {
    write_temp_file(
        "{\"id\":0,\"name\":\"a\"}\n\
         {\"id\": not-json here\n\
         {\"id\":2,\"name\":\"c\"}\n",
    )
}

/// CSV fixture whose column grows more permissive over the scanned range:
/// first N rows are whole numbers, later rows introduce a float and then text,
/// to exercise schema refinement's type lattice.
pub fn csv_fixture_with_type_drift(whole_rows: usize, float_rows: usize, text_rows: usize) -> NamedTempFile {
    let mut buf = String::from("id,value\n");
    let mut id = 0usize;
    for _ in 0..whole_rows {
        buf.push_str(&format!("{id},{id}\n"));
        id += 1;
    }
    for _ in 0..float_rows {
        buf.push_str(&format!("{id},{}.5\n", id));
        id += 1;
    }
    for _ in 0..text_rows {
        buf.push_str(&format!("{id},not-a-number\n"));
        id += 1;
    }
    write_temp_file(&buf)
}
