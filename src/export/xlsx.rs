//! Minimal SpreadsheetML writer for small two-column tables.
//!
//! The workbook holds one sheet named `Sheet1`. Text cells are written as
//! inline strings, so no shared-strings part is needed. Zip entries carry a
//! fixed timestamp, which makes the output byte-identical across runs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::SummaryValue;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: zip container: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// Style 1 is bold, used for the header row.
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs></styleSheet>"#;

fn text_cell(reference: &str, text: &str, style: u8) -> String {
    let style_attr = if style == 0 { String::new() } else { format!(r#" s="{style}""#) };
    format!(
        r#"<c r="{reference}" t="inlineStr"{style_attr}><is><t xml:space="preserve">{}</t></is></c>"#,
        escape(text)
    )
}

fn value_cell(reference: &str, value: &SummaryValue) -> String {
    match value {
        SummaryValue::Number(v) if v.is_finite() => format!(r#"<c r="{reference}"><v>{v}</v></c>"#),
        SummaryValue::Number(v) => text_cell(reference, &v.to_string(), 0),
        SummaryValue::Text(t) => text_cell(reference, t, 0),
    }
}

/// Sheet XML for a header row plus `(label, value)` rows in columns A and B.
pub fn sheet_xml(header: (&str, &str), rows: &[(String, SummaryValue)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    xml.push_str(&format!(
        r#"<row r="1">{}{}</row>"#,
        text_cell("A1", header.0, 1),
        text_cell("B1", header.1, 1)
    ));
    for (i, (label, value)) in rows.iter().enumerate() {
        let r = i + 2;
        xml.push_str(&format!(
            r#"<row r="{r}">{}{}</row>"#,
            text_cell(&format!("A{r}"), label, 0),
            value_cell(&format!("B{r}"), value)
        ));
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Deflated entry stamped 1980-01-01 00:00:00.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Write a two-column workbook to `path`, replacing any existing file.
pub fn write_table(
    path: &Path,
    header: (&str, &str),
    rows: &[(String, SummaryValue)],
) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let zip_err = |source| ExportError::Zip {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let sheet = sheet_xml(header, rows);
    let parts: [(&str, &str); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/styles.xml", STYLES),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];
    for (name, content) in parts {
        writer.start_file(name, entry_options()).map_err(zip_err)?;
        writer.write_all(content.as_bytes()).map_err(io_err)?;
    }

    let mut inner = writer.finish().map_err(zip_err)?;
    inner.flush().map_err(io_err)?;
    Ok(())
}
