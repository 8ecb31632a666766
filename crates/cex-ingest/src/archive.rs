use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::{IngestError, TeiInput, is_tei_name};

/// TEI documents unpacked from one archive, plus what was left behind.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pub documents: Vec<TeiInput>,
    /// Entry names that are not TEI documents.
    pub unsupported: Vec<String>,
    /// Non-fatal problems (e.g. size limit reached).
    pub warnings: Vec<String>,
}

/// Returns true if the given path looks like a supported archive.
pub fn is_archive_path(path: &Path) -> bool {
    let name = lower_file_name(path);
    name.ends_with(".zip") || name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn lower_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// XML documents start with `<` once an optional BOM and whitespace are skipped.
fn looks_like_xml(data: &[u8]) -> bool {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

fn is_ustar(data: &[u8]) -> bool {
    data.get(257..262).is_some_and(|magic| magic == b"ustar")
}

/// Read an archive from disk, detect its type, and extract TEI documents into `dir`.
///
/// Supports ZIP, tar, and tar.gz. Type is detected by extension, then by magic
/// bytes. `max_size` limits total extracted bytes (0 = unlimited); when the
/// limit is reached extraction stops and a warning is recorded.
pub fn extract_archive(
    archive_path: &Path,
    dir: &Path,
    max_size: u64,
) -> Result<ArchiveContents, IngestError> {
    let data = std::fs::read(archive_path).map_err(|source| IngestError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let name = lower_file_name(archive_path);

    let contents = if name.ends_with(".zip") || data.starts_with(b"PK") {
        extract_from_zip(&data, dir, max_size)?
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") || data.starts_with(&[0x1f, 0x8b]) {
        extract_from_tar(GzDecoder::new(&data[..]), dir, max_size)?
    } else if name.ends_with(".tar") || is_ustar(&data) {
        extract_from_tar(&data[..], dir, max_size)?
    } else {
        return Err(IngestError::Unsupported(archive_path.to_path_buf()));
    };

    if contents.documents.is_empty() {
        return Err(IngestError::EmptyArchive(archive_path.to_path_buf()));
    }
    tracing::debug!(
        archive = %archive_path.display(),
        documents = contents.documents.len(),
        unsupported = contents.unsupported.len(),
        "extracted archive"
    );
    Ok(contents)
}

/// Whether to keep reading entries.
enum Flow {
    Continue,
    Stop,
}

/// Applies the entry filters shared by every archive format and writes
/// accepted documents under `dir` with a flat, index-prefixed name.
struct Collector<'a> {
    dir: &'a Path,
    max_size: u64,
    total_size: u64,
    contents: ArchiveContents,
}

impl<'a> Collector<'a> {
    fn new(dir: &'a Path, max_size: u64) -> Self {
        Self {
            dir,
            max_size,
            total_size: 0,
            contents: ArchiveContents::default(),
        }
    }

    fn accept(
        &mut self,
        index: usize,
        name: &Path,
        size: u64,
        reader: &mut impl Read,
    ) -> Result<Flow, IngestError> {
        let name_str = name.to_string_lossy().to_string();

        // Skip macOS resource forks and hidden files
        if name_str.contains("__MACOSX") {
            return Ok(Flow::Continue);
        }
        let Some(basename) = name.file_name().map(|f| f.to_string_lossy().to_string()) else {
            return Ok(Flow::Continue);
        };
        if basename.starts_with('.') {
            return Ok(Flow::Continue);
        }

        if !is_tei_name(&basename) {
            self.contents.unsupported.push(name_str);
            return Ok(Flow::Continue);
        }

        if self.max_size > 0 {
            self.total_size += size;
            if self.total_size > self.max_size {
                self.contents.warnings.push(format!(
                    "Size limit ({}MB) reached after {} files, skipping remaining",
                    self.max_size / 1024 / 1024,
                    self.contents.documents.len()
                ));
                return Ok(Flow::Stop);
            }
        }

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(|source| IngestError::Io {
            path: name.to_path_buf(),
            source,
        })?;
        if !looks_like_xml(&buf) {
            self.contents.warnings.push(format!("{name_str} is not an XML document, skipping"));
            return Ok(Flow::Continue);
        }

        let out_path = self.dir.join(format!("{index}_{basename}"));
        std::fs::write(&out_path, &buf).map_err(|source| IngestError::Io {
            path: out_path.clone(),
            source,
        })?;
        self.contents.documents.push(TeiInput {
            path: out_path,
            name: basename,
        });
        Ok(Flow::Continue)
    }
}

/// Extract TEI documents from a ZIP archive held in memory.
pub fn extract_from_zip(data: &[u8], dir: &Path, max_size: u64) -> Result<ArchiveContents, IngestError> {
    let cursor = std::io::Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)?;
    let mut collector = Collector::new(dir, max_size);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        // Path traversal attempts have no enclosed name
        let Some(name) = file.enclosed_name() else {
            tracing::warn!(entry = %file.name(), "skipping unsafe archive entry");
            continue;
        };
        let size = file.size();
        if let Flow::Stop = collector.accept(i, &name, size, &mut file)? {
            break;
        }
    }
    Ok(collector.contents)
}

/// Extract TEI documents from a tar stream (plain or already decompressed).
pub fn extract_from_tar<R: Read>(reader: R, dir: &Path, max_size: u64) -> Result<ArchiveContents, IngestError> {
    let mut archive = Archive::new(reader);
    let tar_err = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut collector = Collector::new(dir, max_size);

    for (i, entry) in archive.entries().map_err(tar_err)?.enumerate() {
        let mut entry = entry.map_err(tar_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path: PathBuf = entry.path().map_err(tar_err)?.to_path_buf();
        let unsafe_path = path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if unsafe_path {
            tracing::warn!(entry = %path.display(), "skipping unsafe archive entry");
            continue;
        }
        let size = entry.size();
        if let Flow::Stop = collector.accept(i, &path, size, &mut entry)? {
            break;
        }
    }
    Ok(collector.contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEI: &[u8] = br#"<?xml version="1.0"?><TEI xmlns="http://www.tei-c.org/ns/1.0"/>"#;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_zip_filters_entries() {
        let dir = tempfile::tempdir().unwrap();
        let data = zip_bytes(&[
            ("papers/a.grobid.tei.xml", TEI),
            ("__MACOSX/papers/._a.grobid.tei.xml", TEI),
            ("papers/.hidden.xml", TEI),
            ("papers/notes.txt", b"plain"),
            ("../evil.xml", TEI),
            ("papers/fake.xml", b"%PDF-1.4"),
        ]);
        let out = extract_from_zip(&data, dir.path(), 0).unwrap();

        let names: Vec<_> = out.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.grobid.tei.xml"]);
        assert!(out.documents[0].path.exists());
        assert_eq!(out.unsupported, vec!["papers/notes.txt"]);
        assert_eq!(out.warnings.len(), 1, "fake.xml is not XML: {:?}", out.warnings);
    }

    #[test]
    fn test_size_limit_stops_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let data = zip_bytes(&[("a.xml", TEI), ("b.xml", TEI)]);
        let limit = TEI.len() as u64 + 1;
        let out = extract_from_zip(&data, dir.path(), limit).unwrap();
        assert_eq!(out.documents.len(), 1);
        assert!(out.warnings[0].contains("Size limit"));
    }

    #[test]
    fn test_tar_and_tar_gz_archives() {
        let dir = tempfile::tempdir().unwrap();
        let tar = tar_bytes(&[("x/paper.xml", TEI), ("x/paper.pdf", b"%PDF-1.4")]);

        let plain = dir.path().join("bundle.tar");
        std::fs::write(&plain, &tar).unwrap();
        let out = extract_archive(&plain, dir.path(), 0).unwrap();
        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.unsupported, vec!["x/paper.pdf"]);

        let gz = dir.path().join("bundle.tgz");
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&tar).unwrap();
        std::fs::write(&gz, enc.finish().unwrap()).unwrap();
        let out = extract_archive(&gz, dir.path(), 0).unwrap();
        assert_eq!(out.documents[0].name, "paper.xml");
    }

    #[test]
    fn test_archive_without_documents_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.zip");
        std::fs::write(&path, zip_bytes(&[("readme.md", b"# hi")])).unwrap();
        let err = extract_archive(&path, dir.path(), 0).unwrap_err();
        assert!(matches!(err, IngestError::EmptyArchive(_)), "got {err:?}");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.rar");
        std::fs::write(&path, b"Rar!\x1a\x07").unwrap();
        assert!(matches!(
            extract_archive(&path, dir.path(), 0),
            Err(IngestError::Unsupported(_))
        ));
    }

    #[test]
    fn test_is_archive_path() {
        assert!(is_archive_path(Path::new("papers.ZIP")));
        assert!(is_archive_path(Path::new("papers.tar.gz")));
        assert!(is_archive_path(Path::new("papers.tar")));
        assert!(!is_archive_path(Path::new("paper.xml")));
    }
}
