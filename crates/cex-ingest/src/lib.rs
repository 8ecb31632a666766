use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod archive;

pub use archive::{ArchiveContents, extract_archive, is_archive_path};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("input not found: {0}")]
    Missing(PathBuf),
    #[error("unsupported input format: {0}")]
    Unsupported(PathBuf),
    #[error("no TEI documents found in archive {0}")]
    EmptyArchive(PathBuf),
}

/// One TEI document ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeiInput {
    pub path: PathBuf,
    /// Name shown to the user and used for output files.
    pub name: String,
}

impl TeiInput {
    fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path: path.to_path_buf(),
            name,
        }
    }

    /// Output stem: the file name without `.xml` and GROBID's `.tei` / `.grobid` suffixes.
    pub fn stem(&self) -> &str {
        let mut stem = self.name.as_str();
        for suffix in [".xml", ".tei", ".grobid"] {
            let cut = stem.len().saturating_sub(suffix.len());
            if cut > 0 && stem.get(cut..).is_some_and(|tail| tail.eq_ignore_ascii_case(suffix)) {
                stem = &stem[..cut];
            }
        }
        stem
    }
}

/// Every input the caller named, resolved to TEI documents.
#[derive(Debug, Default)]
pub struct InputSet {
    pub documents: Vec<TeiInput>,
    /// Files (or archive entries) that are not TEI documents.
    pub unsupported: Vec<String>,
    pub warnings: Vec<String>,
}

impl InputSet {
    fn absorb(&mut self, origin: &Path, contents: ArchiveContents) {
        self.documents.extend(contents.documents);
        self.unsupported.extend(
            contents
                .unsupported
                .into_iter()
                .map(|entry| format!("{}:{entry}", origin.display())),
        );
        self.warnings.extend(contents.warnings);
    }
}

pub(crate) fn is_tei_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".xml")
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|f| f.to_string_lossy().starts_with('.'))
}

/// Resolve files, directories and archives into TEI documents.
///
/// Directories are walked recursively in name order, skipping hidden
/// entries. Archives are unpacked into numbered subdirectories of `scratch`;
/// one that cannot be read is recorded as a warning and the rest continue.
/// `max_size` caps the bytes extracted from each archive (0 = unlimited).
pub fn resolve_inputs(inputs: &[PathBuf], scratch: &Path, max_size: u64) -> Result<InputSet, IngestError> {
    let mut set = InputSet::default();
    let mut archives = 0usize;
    for input in inputs {
        if !input.exists() {
            return Err(IngestError::Missing(input.clone()));
        }
        if input.is_dir() {
            walk_dir(input, scratch, max_size, &mut archives, &mut set)?;
        } else {
            resolve_file(input, scratch, max_size, &mut archives, &mut set)?;
        }
    }
    tracing::debug!(
        documents = set.documents.len(),
        unsupported = set.unsupported.len(),
        archives,
        "resolved inputs"
    );
    Ok(set)
}

fn walk_dir(
    dir: &Path,
    scratch: &Path,
    max_size: u64,
    archives: &mut usize,
    set: &mut InputSet,
) -> Result<(), IngestError> {
    let io_err = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();

    for path in entries.iter().filter(|p| !is_hidden(p)) {
        if path.is_dir() {
            walk_dir(path, scratch, max_size, archives, set)?;
        } else {
            resolve_file(path, scratch, max_size, archives, set)?;
        }
    }
    Ok(())
}

fn resolve_file(
    path: &Path,
    scratch: &Path,
    max_size: u64,
    archives: &mut usize,
    set: &mut InputSet,
) -> Result<(), IngestError> {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    if is_tei_name(&name) {
        set.documents.push(TeiInput::from_path(path));
    } else if is_archive_path(path) {
        let dir = scratch.join(archives.to_string());
        *archives += 1;
        std::fs::create_dir_all(&dir).map_err(|source| IngestError::Io {
            path: dir.clone(),
            source,
        })?;
        match extract_archive(path, &dir, max_size) {
            Ok(contents) => set.absorb(path, contents),
            Err(e) => {
                tracing::warn!(archive = %path.display(), error = %e, "skipping archive");
                set.warnings.push(e.to_string());
            }
        }
    } else {
        set.unsupported.push(path.display().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEI: &str = r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"/>"#;

    #[test]
    fn test_stem_strips_grobid_suffixes() {
        let input = TeiInput::from_path(Path::new("/data/paper.grobid.tei.xml"));
        assert_eq!(input.stem(), "paper");
        let input = TeiInput::from_path(Path::new("report.XML"));
        assert_eq!(input.stem(), "report");
    }

    #[test]
    fn test_resolve_directory_recursively() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("nested")).unwrap();
        std::fs::create_dir_all(root.path().join(".git")).unwrap();
        std::fs::write(root.path().join("b.xml"), TEI).unwrap();
        std::fs::write(root.path().join("nested/a.xml"), TEI).unwrap();
        std::fs::write(root.path().join(".git/c.xml"), TEI).unwrap();
        std::fs::write(root.path().join("notes.txt"), "x").unwrap();

        let set = resolve_inputs(&[root.path().to_path_buf()], scratch.path(), 0).unwrap();
        let names: Vec<_> = set.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b.xml", "a.xml"]);
        assert_eq!(set.unsupported.len(), 1);
        assert!(set.unsupported[0].ends_with("notes.txt"));
    }

    #[test]
    fn test_resolve_archive_into_scratch() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let archive = root.path().join("batch.zip");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        writer
            .start_file("p1.tei.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(TEI.as_bytes()).unwrap();
        writer
            .start_file("p1.pdf", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"%PDF-1.4").unwrap();
        writer.finish().unwrap();

        let set = resolve_inputs(&[archive.clone()], scratch.path(), 0).unwrap();
        assert_eq!(set.documents.len(), 1);
        assert!(set.documents[0].path.starts_with(scratch.path()));
        assert_eq!(set.documents[0].stem(), "p1");
        assert_eq!(set.unsupported, vec![format!("{}:p1.pdf", archive.display())]);
    }

    #[test]
    fn test_broken_archive_is_a_warning() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let archive = root.path().join("broken.zip");
        std::fs::write(&archive, b"PK\x03\x04 truncated").unwrap();
        std::fs::write(root.path().join("ok.xml"), TEI).unwrap();

        let set = resolve_inputs(&[root.path().to_path_buf()], scratch.path(), 0).unwrap();
        assert_eq!(set.documents.len(), 1);
        assert_eq!(set.warnings.len(), 1);
    }

    #[test]
    fn test_missing_input_is_error() {
        let scratch = tempfile::tempdir().unwrap();
        let err = resolve_inputs(&[PathBuf::from("/no/such/file.xml")], scratch.path(), 0).unwrap_err();
        assert!(matches!(err, IngestError::Missing(_)));
    }
}
