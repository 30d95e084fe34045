// Documents module
// Reads plain text and markdown files from a folder as numbered pages


use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::store::DocumentPage;

/// Separator between pages in extracted text
pub const PAGE_SEPARATOR: char = '\x0c';

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Pages read from a documents folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedFolder {
    pub pages: Vec<DocumentPage>,
    /// Files that produced pages
    pub files: usize,
    /// Files that could not be read as text
    pub skipped: usize,
}

/// Load every supported file in `path`, creating the folder when it is missing
#[inline]
pub fn load_folder<P: AsRef<Path>>(path: P) -> Result<LoadedFolder> {
    let path = path.as_ref();

    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create documents folder: {}", path.display()))?;
        info!(
            "Created documents folder {}; add .txt or .md files to it",
            path.display()
        );
        return Ok(LoadedFolder::default());
    }

    let entries = fs::read_dir(path)
        .with_context(|| format!("Failed to read documents folder: {}", path.display()))?;

    let files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_supported(p))
        .sorted_by_key(|p| p.file_name().map(|n| n.to_os_string()))
        .collect();

    let mut loaded = LoadedFolder::default();
    for file in files {
        let source = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match fs::read_to_string(&file) {
            Ok(content) => {
                let pages = split_pages(&content, &source);
                debug!("Read {} pages from {}", pages.len(), source);
                loaded.pages.extend(pages);
                loaded.files += 1;
            }
            Err(e) => {
                warn!("Skipping {}: {}", file.display(), e);
                loaded.skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} pages from {} files in {} ({} skipped)",
        loaded.pages.len(),
        loaded.files,
        path.display(),
        loaded.skipped
    );

    Ok(loaded)
}

/// Split extracted text into 1-based pages on the form-feed separator
#[inline]
pub fn split_pages(content: &str, source: &str) -> Vec<DocumentPage> {
    content
        .split(PAGE_SEPARATOR)
        .zip(1_u32..)
        .map(|(text, page)| DocumentPage::new(text, source, page))
        .collect()
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}
