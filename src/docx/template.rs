//! Template location and archive parsing.
//!
//! The packaged template is resolved from an env override, the deploy working
//! directory, then the repo's own `templates/` directory. Bytes are cached
//! for the process lifetime since the template is static build content.

use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::read::ZipArchive;

use super::TemplateError;

pub const TEMPLATE_FILE: &str = "product_selection_template.docx";

/// Read-through byte cache over the candidate template paths.
#[derive(Clone)]
pub struct TemplateStore {
    candidates: Arc<Vec<PathBuf>>,
    cache: Arc<RwLock<HashMap<PathBuf, Arc<Vec<u8>>>>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var("TEMPLATE_PATH") {
            if !path.trim().is_empty() {
                candidates.push(PathBuf::from(path));
            }
        }
        candidates.push(PathBuf::from("./templates").join(TEMPLATE_FILE));
        candidates.push(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates")).join(TEMPLATE_FILE));
        Self::with_paths(candidates)
    }

    /// Build a store over explicit candidate paths.
    pub fn with_paths(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates: Arc::new(candidates),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve the first existing candidate path and return its bytes.
    pub fn load(&self) -> Result<Arc<Vec<u8>>, TemplateError> {
        let path = self
            .candidates
            .iter()
            .find(|candidate| candidate.exists())
            .ok_or(TemplateError::NotFound)?;

        if let Some(bytes) = self.cache.read().get(path) {
            debug!("template cache hit for {}", path.display());
            return Ok(bytes.clone());
        }

        let bytes = Arc::new(fs::read(path).map_err(TemplateError::Io)?);
        self.cache.write().insert(path.clone(), bytes.clone());
        info!("loaded template from {}", path.display());
        Ok(bytes)
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The template's zip entries, read fully into memory.
pub struct TemplateArchive {
    entries: Vec<(String, Vec<u8>)>,
}

impl TemplateArchive {
    pub fn parse(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(TemplateError::Corrupted)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(TemplateError::Corrupted)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().replace('\\', "/");
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(TemplateError::Io)?;
            entries.push((name, data));
        }
        Ok(Self { entries })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn into_parts(self) -> Vec<(String, Vec<u8>)> {
        self.entries
    }
}
