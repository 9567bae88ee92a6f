//! NDJSON corpus export
//!
//! One JSON object per line, with the same fields as the `articles` table.

use crate::output::{OutputError, OutputResult};
use crate::storage::ArticleSink;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every stored article (optionally for one source) to `writer`
///
/// Returns the number of articles written.
pub fn export_ndjson<W: Write>(
    sink: &dyn ArticleSink,
    source_id: Option<&str>,
    writer: &mut W,
) -> OutputResult<u64> {
    let mut written = 0u64;
    let mut failure: Option<OutputError> = None;

    sink.for_each_article(source_id, &mut |article| {
        if failure.is_some() {
            return Ok(());
        }
        let result = serde_json::to_writer(&mut *writer, &article)
            .map_err(OutputError::from)
            .and_then(|()| writer.write_all(b"\n").map_err(OutputError::from));
        match result {
            Ok(()) => written += 1,
            Err(e) => failure = Some(e),
        }
        Ok(())
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    writer.flush()?;
    Ok(written)
}

/// Exports to a file, replacing it if it exists
pub fn export_to_file(
    sink: &dyn ArticleSink,
    source_id: Option<&str>,
    path: &Path,
) -> OutputResult<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let written = export_ndjson(sink, source_id, &mut writer)?;
    tracing::info!("Exported {} articles to {}", written, path.display());
    Ok(written)
}
