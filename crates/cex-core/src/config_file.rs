use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{AnchorStyle, SectionErrorPolicy};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub extraction: Option<ExtractionSection>,
    pub concurrency: Option<ConcurrencySection>,
    pub alignment: Option<AlignmentSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSection {
    pub exceptions_path: Option<String>,
    pub formula_regex: Option<String>,
    pub untitled_prefix: Option<String>,
    pub figure_section: Option<String>,
    pub anchor_style: Option<AnchorStyle>,
    pub section_errors: Option<SectionErrorPolicy>,
    pub emit_targets: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencySection {
    pub num_workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_archive_size_mb: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignmentSection {
    pub headings_path: Option<String>,
    pub mappings_path: Option<String>,
    pub threshold: Option<f64>,
}

/// Platform config directory path: `<config_dir>/cex/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cex").join("config.toml"))
}

/// Load config by cascading CWD `.cex.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".cex.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Pick the overlay's field if set, else the base's.
macro_rules! pick {
    ($base:expr, $overlay:expr, $field:ident) => {
        $overlay
            .as_ref()
            .and_then(|s| s.$field.clone())
            .or_else(|| $base.as_ref().and_then(|s| s.$field.clone()))
    };
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        extraction: Some(ExtractionSection {
            exceptions_path: pick!(base.extraction, overlay.extraction, exceptions_path),
            formula_regex: pick!(base.extraction, overlay.extraction, formula_regex),
            untitled_prefix: pick!(base.extraction, overlay.extraction, untitled_prefix),
            figure_section: pick!(base.extraction, overlay.extraction, figure_section),
            anchor_style: pick!(base.extraction, overlay.extraction, anchor_style),
            section_errors: pick!(base.extraction, overlay.extraction, section_errors),
            emit_targets: pick!(base.extraction, overlay.extraction, emit_targets),
        }),
        concurrency: Some(ConcurrencySection {
            num_workers: pick!(base.concurrency, overlay.concurrency, num_workers),
            timeout_secs: pick!(base.concurrency, overlay.concurrency, timeout_secs),
            max_archive_size_mb: pick!(base.concurrency, overlay.concurrency, max_archive_size_mb),
        }),
        alignment: Some(AlignmentSection {
            headings_path: pick!(base.alignment, overlay.alignment, headings_path),
            mappings_path: pick!(base.alignment, overlay.alignment, mappings_path),
            threshold: pick!(base.alignment, overlay.alignment, threshold),
        }),
    }
}
