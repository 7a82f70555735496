use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use crate::error::ImportError;

/// One file inside the EPUB container, fully buffered.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    path: String,
    data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// Full slash-delimited path inside the archive.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name including extension.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// File name without extension.
    pub fn basename(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        }
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        match name.rfind('.') {
            Some(dot) if dot > 0 => Some(name[dot + 1..].to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn read(&self) -> &[u8] {
        &self.data
    }

    /// Contents as text; invalid UTF-8 is replaced and a BOM dropped.
    pub fn read_text(&self) -> String {
        let bytes = self
            .data
            .strip_prefix(&[0xEF, 0xBB, 0xBF])
            .unwrap_or(&self.data);
        String::from_utf8_lossy(bytes).into_owned()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Upper bound on the buffer reserved up front for one entry.
const MAX_PREALLOC: u64 = 1 << 20;

/// The declared size comes from the archive and is not trusted beyond the cap.
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Read every file entry of a ZIP archive into memory, in archive order.
pub fn read_archive<R: Read + Seek>(reader: R) -> Result<Vec<ArchiveEntry>, ImportError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let path = file.name().to_string();
        let mut data = Vec::with_capacity(initial_capacity(file.size()));
        file.read_to_end(&mut data)?;
        entries.push(ArchiveEntry::new(path, data));
    }

    debug!(entries = entries.len(), "read archive");
    Ok(entries)
}

/// Open an EPUB file from disk.
pub fn open_archive(path: &Path) -> Result<Vec<ArchiveEntry>, ImportError> {
    let file = File::open(path)?;
    read_archive(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn test_entry_name_parts() {
        let entry = ArchiveEntry::new("OEBPS/Text/chapter.01.XHTML", "x");
        assert_eq!(entry.name(), "chapter.01.XHTML");
        assert_eq!(entry.basename(), "chapter.01");
        assert_eq!(entry.extension().as_deref(), Some("xhtml"));

        let bare = ArchiveEntry::new("mimetype", "application/epub+zip");
        assert_eq!(bare.basename(), "mimetype");
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        assert_eq!(initial_capacity(512), 512);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOC as usize);
    }

    #[test]
    fn test_read_text_strips_bom() {
        let entry = ArchiveEntry::new("a.xhtml", b"\xEF\xBB\xBF<html/>".to_vec());
        assert_eq!(entry.read_text(), "<html/>");
    }

    #[test]
    fn test_read_archive_skips_directories() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.add_directory("OEBPS/", options).unwrap();
        writer.start_file("mimetype", options).unwrap();
        writer.write_all(b"application/epub+zip").unwrap();
        writer.start_file("OEBPS/content.opf", options).unwrap();
        writer.write_all(b"<package/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let entries = read_archive(Cursor::new(bytes)).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path()).collect();
        assert_eq!(paths, vec!["mimetype", "OEBPS/content.opf"]);
        assert_eq!(entries[1].read_text(), "<package/>");
    }
}
