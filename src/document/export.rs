use super::Document;
use anyhow::Context;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const ODT_MIMETYPE: &str = "application/vnd.oasis.opendocument.text";

const MANIFEST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>
"#;

const CONTENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2">
<office:body>
<office:text>
"#;

const CONTENT_TAIL: &str = "</office:text>\n</office:body>\n</office:document-content>\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Odt,
}

impl ExportFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("odt") => Self::Odt,
            _ => Self::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Odt => "odt",
        }
    }
}

/// Writes the document body to `out_path`: an OpenDocument text package
/// for `.odt`, UTF-8 plain text otherwise.
pub fn export_document(doc: &Document, out_path: &Path) -> anyhow::Result<ExportFormat> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let format = ExportFormat::for_path(out_path);
    match format {
        ExportFormat::Text => std::fs::write(out_path, doc.body.as_bytes())
            .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?,
        ExportFormat::Odt => write_odt(&doc.body, out_path)?,
    }
    Ok(format)
}

fn write_odt(body: &str, out_path: &Path) -> anyhow::Result<()> {
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);

    // mimetype must be the first entry and stored uncompressed.
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file("mimetype", stored)
        .context("failed to start mimetype entry")?;
    zip.write_all(ODT_MIMETYPE.as_bytes())
        .context("failed to write mimetype entry")?;

    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("META-INF/manifest.xml", deflated)
        .context("failed to start manifest entry")?;
    zip.write_all(MANIFEST_XML.as_bytes())
        .context("failed to write manifest entry")?;

    zip.start_file("content.xml", deflated)
        .context("failed to start content entry")?;
    zip.write_all(content_xml(body).as_bytes())
        .context("failed to write content entry")?;

    zip.finish().context("failed to finalize odt package")?;
    Ok(())
}

fn content_xml(body: &str) -> String {
    let mut out = String::from(CONTENT_HEAD);
    for line in body.split('\n') {
        out.push_str("<text:p>");
        out.push_str(&paragraph_xml(line.trim_end_matches('\r')));
        out.push_str("</text:p>\n");
    }
    out.push_str(CONTENT_TAIL);
    out
}

/// Escapes a single line. ODF collapses whitespace, so runs of spaces and
/// tabs become explicit `text:s` / `text:tab` elements to keep the
/// measurement table aligned.
fn paragraph_xml(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut spaces = 0usize;
    let mut at_start = true;

    let flush = |out: &mut String, spaces: &mut usize, at_start: bool| {
        match *spaces {
            0 => {}
            1 if !at_start => out.push(' '),
            n => out.push_str(&format!("<text:s text:c=\"{}\"/>", n)),
        }
        *spaces = 0;
    };

    for ch in line.chars() {
        if ch == ' ' {
            spaces += 1;
            continue;
        }
        flush(&mut out, &mut spaces, at_start);
        at_start = false;
        match ch {
            '\t' => out.push_str("<text:tab/>"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    flush(&mut out, &mut spaces, at_start);
    out
}
