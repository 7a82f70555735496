use crate::cli::Cli;
use anyhow::{bail, Context, Result};
use epub2vault::{import_epub, open_archive, FsStore, Html2MdConverter, ImportSummary, LogReporter};
use std::fs;
use std::path::Path;
use tracing::error;

pub fn convert(cli: &Cli) -> Result<()> {
    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output folder: {}", cli.output.display()))?;
    let mut store = FsStore::new(cli.output.clone());

    let mut failed = 0;
    for input in &cli.input {
        match convert_one(input, &mut store) {
            Ok(summary) => eprintln!(
                "Imported {} notes{} from {} to {}{}",
                summary.notes,
                if summary.attachments > 0 {
                    format!(" and {} attachments", summary.attachments)
                } else {
                    String::new()
                },
                input.display(),
                cli.output.display(),
                if summary.failed > 0 {
                    format!(" ({} files failed)", summary.failed)
                } else {
                    String::new()
                }
            ),
            Err(e) => {
                error!("{:#}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} books could not be imported", failed, cli.input.len());
    }
    Ok(())
}

fn convert_one(input: &Path, store: &mut FsStore) -> Result<ImportSummary> {
    let name = input
        .file_stem()
        .context("Input file has no name")?
        .to_string_lossy()
        .into_owned();
    let entries = open_archive(input)
        .with_context(|| format!("Failed to open EPUB: {}", input.display()))?;

    let mut reporter = LogReporter::new();
    import_epub(&name, entries, store, &mut reporter, &Html2MdConverter)
        .with_context(|| format!("Failed to import {}", input.display()))?;
    Ok(reporter.summary())
}
