//! Known-scheme catalog: title lookups and per-title index layouts.
//!
//! Persisted as CBOR. The catalog is plain state owned by whoever builds the
//! [`crate::FormatCatalog`]; tests start from [`SchemeCatalog::default`].

use crate::error::{GarcError, Result};
use crate::read::view::ArcView;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DATABASE_VERSION: u32 = 1;

/// Cyberworks index layout parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataScheme {
    /// Bytes following each 12-byte index record.
    pub extra_header_size: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SchemeDatabase {
    pub version: u32,
    /// Executable file name (lowercase) to game title.
    pub game_map: BTreeMap<String, String>,
    pub cyberworks: BTreeMap<String, DataScheme>,
}

impl Default for SchemeDatabase {
    fn default() -> Self {
        Self {
            version: DATABASE_VERSION,
            game_map: BTreeMap::new(),
            cyberworks: BTreeMap::new(),
        }
    }
}

type PromptFn = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
pub struct SchemeCatalog {
    db: SchemeDatabase,
    prompt: Option<PromptFn>,
    resolved: Mutex<HashMap<PathBuf, DataScheme>>,
}

impl SchemeCatalog {
    pub fn new(db: SchemeDatabase) -> Self {
        Self {
            db,
            ..Self::default()
        }
    }

    pub fn load(reader: impl Read) -> Result<Self> {
        let db: SchemeDatabase =
            ciborium::de::from_reader(reader).map_err(|e| GarcError::Catalog(e.to_string()))?;
        if db.version > DATABASE_VERSION {
            return Err(GarcError::Catalog(format!(
                "database version {} is newer than {}",
                db.version, DATABASE_VERSION
            )));
        }
        Ok(Self::new(db))
    }

    pub fn save(&self, writer: impl Write) -> Result<()> {
        ciborium::ser::into_writer(&self.db, writer).map_err(|e| GarcError::Catalog(e.to_string()))
    }

    /// Add entries from `other` that are not known yet. Returns how many
    /// were added.
    pub fn merge(&mut self, other: SchemeDatabase) -> usize {
        let mut added = 0;
        for (exe, title) in other.game_map {
            if let std::collections::btree_map::Entry::Vacant(v) = self.db.game_map.entry(exe.to_lowercase()) {
                v.insert(title);
                added += 1;
            }
        }
        for (title, scheme) in other.cyberworks {
            if let std::collections::btree_map::Entry::Vacant(v) = self.db.cyberworks.entry(title) {
                v.insert(scheme);
                added += 1;
            }
        }
        if added > 0 {
            self.clear_resolved();
        }
        added
    }

    pub fn database(&self) -> &SchemeDatabase {
        &self.db
    }

    pub fn add_game(&mut self, exe_name: &str, title: &str) {
        self.db.game_map.insert(exe_name.to_lowercase(), title.to_owned());
        self.clear_resolved();
    }

    pub fn add_cyberworks(&mut self, title: &str, scheme: DataScheme) {
        self.db.cyberworks.insert(title.to_owned(), scheme);
        self.clear_resolved();
    }

    /// Callback asked for a scheme title when lookup by executable fails.
    pub fn set_prompt(&mut self, prompt: impl Fn(&str) -> Option<String> + Send + Sync + 'static) {
        self.prompt = Some(Box::new(prompt));
    }

    /// Game title for the executable next to (or one level above) the archive.
    pub fn lookup_title(&self, view: &ArcView) -> Option<String> {
        let dir = view.dir();
        let parent = dir.parent();
        [parent, Some(dir)]
            .into_iter()
            .flatten()
            .find_map(|d| self.title_in(d))
    }

    fn title_in(&self, dir: &Path) -> Option<String> {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.to_lowercase().ends_with(".exe"))
            .collect();
        names.sort();
        names
            .iter()
            .find_map(|n| self.db.game_map.get(&n.to_lowercase()).cloned())
    }

    /// Index layout for a Cyberworks archive: by title, then by prompt,
    /// else the default layout. Cached per directory.
    pub fn resolve_cyberworks(&self, view: &ArcView) -> DataScheme {
        let key = view.dir().to_path_buf();
        if let Some(s) = self.resolved.lock().ok().and_then(|m| m.get(&key).copied()) {
            return s;
        }
        let scheme = self
            .lookup_title(view)
            .and_then(|t| self.db.cyberworks.get(&t).copied())
            .or_else(|| {
                let prompt = self.prompt.as_ref()?;
                let name = prompt("Archive index layout is title specific; choose a title")?;
                let scheme = self.db.cyberworks.get(&name).copied();
                if scheme.is_none() {
                    tracing::warn!(title = %name, "unknown scheme title, using default layout");
                }
                scheme
            })
            .unwrap_or_default();
        tracing::debug!(dir = %key.display(), extra = scheme.extra_header_size, "cyberworks scheme");
        if let Ok(mut m) = self.resolved.lock() {
            m.insert(key, scheme);
        }
        scheme
    }

    fn clear_resolved(&mut self) {
        if let Ok(m) = self.resolved.get_mut() {
            m.clear();
        }
    }
}

impl std::fmt::Debug for SchemeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeCatalog")
            .field("db", &self.db)
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}
