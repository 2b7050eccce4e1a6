//! Catalog data model and JSON storage.
//!
//! A catalog node is statically either a [`Node::Group`] or a [`Node::Leaf`].
//! Groups keep insertion order so a load/save cycle reproduces the file and
//! new keys land at the end of their group.

use crate::error::SyncError;
use crate::flatten::{join_path, SEPARATOR};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Named children of one group level.
pub type Group = IndexMap<String, Node>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Group(Group),
    Leaf(String),
}

impl Node {
    /// Text of a leaf node; `None` for groups.
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            Node::Leaf(text) => Some(text),
            Node::Group(_) => None,
        }
    }

    /// Children of a group node; `None` for leaves.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(group) => Some(group),
            Node::Leaf(_) => None,
        }
    }
}

/// One locale's translation tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    locale: String,
    root: Group,
}

impl Catalog {
    /// Wrap an existing tree as the catalog of `locale`.
    pub fn with_root(locale: impl Into<String>, root: Group) -> Self {
        Self {
            locale: locale.into(),
            root,
        }
    }

    /// Locale code the catalog was loaded for, e.g. "fr".
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Top-level group of the tree.
    pub fn root(&self) -> &Group {
        &self.root
    }

    /// Mutable top-level group, used when merging resolved values.
    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    /// Look up the node at a dotted key path.
    pub fn get(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split(SEPARATOR);
        let first = segments.next()?;
        let mut node = self.root.get(first)?;
        for segment in segments {
            node = node.as_group()?.get(segment)?;
        }
        Some(node)
    }

    /// Leaf text at `path`, if the path resolves to a leaf.
    pub fn leaf(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Node::as_leaf)
    }

    /// Remove the node at `path`, keeping the order of its siblings.
    pub fn remove(&mut self, path: &str) -> Option<Node> {
        let mut segments: Vec<&str> = path.split(SEPARATOR).collect();
        let last = segments.pop()?;
        let mut group = &mut self.root;
        for segment in segments {
            group = match group.get_mut(segment)? {
                Node::Group(child) => child,
                Node::Leaf(_) => return None,
            };
        }
        group.shift_remove(last)
    }

    /// Parse a catalog document.
    ///
    /// Numbers and booleans are migrated to strings and `null` entries are
    /// dropped; both are recorded in the returned [`LoadNotes`]. Arrays and a
    /// non-object root are rejected as malformed.
    pub fn parse(locale: &str, text: &str) -> Result<(Catalog, LoadNotes), SyncError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SyncError::malformed(locale, e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(SyncError::malformed(locale, "document root is not an object"));
        };

        let mut notes = LoadNotes::default();
        let root = convert_group(locale, map, "", &mut notes)?;
        Ok((Catalog::with_root(locale, root), notes))
    }

    /// Canonical serialized form: 2-space indentation, literal non-ASCII,
    /// single trailing newline.
    pub fn to_json_string(&self) -> Result<String, SyncError> {
        let mut text = serde_json::to_string_pretty(&self.root)
            .map_err(|e| SyncError::malformed(&self.locale, e.to_string()))?;
        text.push('\n');
        Ok(text)
    }
}

/// Storage artifacts repaired while loading a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadNotes {
    /// Paths whose number/boolean value was converted to a string
    pub migrated: Vec<String>,
    /// Paths whose `null` value was dropped
    pub removed: Vec<String>,
}

impl LoadNotes {
    /// True when the file needed no repair.
    pub fn is_clean(&self) -> bool {
        self.migrated.is_empty() && self.removed.is_empty()
    }
}

fn convert_group(
    locale: &str,
    map: serde_json::Map<String, Value>,
    prefix: &str,
    notes: &mut LoadNotes,
) -> Result<Group, SyncError> {
    let mut group = Group::with_capacity(map.len());
    for (key, value) in map {
        // Key paths cannot represent these, so flattening would merge them
        // into a neighbouring path.
        if key.is_empty() || key.contains(SEPARATOR) {
            return Err(SyncError::malformed(
                locale,
                format!("unsupported key '{}' under '{}'", key, prefix),
            ));
        }
        let path = join_path(prefix, &key);
        match value {
            Value::String(text) => {
                group.insert(key, Node::Leaf(text));
            }
            Value::Object(child) => {
                let child = convert_group(locale, child, &path, notes)?;
                group.insert(key, Node::Group(child));
            }
            Value::Number(number) => {
                notes.migrated.push(path);
                group.insert(key, Node::Leaf(number.to_string()));
            }
            Value::Bool(flag) => {
                notes.migrated.push(path);
                group.insert(key, Node::Leaf(flag.to_string()));
            }
            Value::Null => notes.removed.push(path),
            Value::Array(_) => {
                return Err(SyncError::malformed(
                    locale,
                    format!("array value at '{}'", path),
                ));
            }
        }
    }
    Ok(group)
}

/// Directory of `<locale>.json` catalog files.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    root: PathBuf,
}

impl CatalogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File backing `locale`: `<root>/<locale>.json`.
    pub fn path_for(&self, locale: &str) -> PathBuf {
        self.root.join(format!("{}.json", locale))
    }

    /// Read and parse the catalog of `locale`.
    ///
    /// # Returns
    /// The catalog plus notes on any values repaired while parsing.
    /// A missing file is [`SyncError::CatalogNotFound`]; invalid JSON or UTF-8
    /// is [`SyncError::MalformedCatalog`].
    pub fn load(&self, locale: &str) -> Result<(Catalog, LoadNotes), SyncError> {
        let path = self.path_for(locale);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::CatalogNotFound {
                    locale: locale.to_string(),
                    path,
                });
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(SyncError::malformed(locale, "file is not valid UTF-8"));
            }
            Err(source) => return Err(SyncError::Io { path, source }),
        };

        let (catalog, notes) = Catalog::parse(locale, &text)?;
        for path in &notes.migrated {
            warn!("{}: migrated non-string value at '{}' to a string", locale, path);
        }
        for path in &notes.removed {
            warn!("{}: dropped null value at '{}'", locale, path);
        }
        Ok((catalog, notes))
    }

    /// Write a catalog in canonical form.
    ///
    /// Returns `false` without touching the file when its bytes already match.
    /// The document is written to a sibling temp file and renamed into place.
    pub fn save(&self, catalog: &Catalog) -> Result<bool, SyncError> {
        let path = self.path_for(catalog.locale());
        let text = catalog.to_json_string()?;

        if let Ok(existing) = fs::read(&path) {
            if existing == text.as_bytes() {
                debug!("{}: catalog unchanged, skipping write", catalog.locale());
                return Ok(false);
            }
        }

        fs::create_dir_all(&self.root).map_err(|source| SyncError::Io {
            path: self.root.clone(),
            source,
        })?;
        let tmp = self.root.join(format!(".{}.json.tmp", catalog.locale()));
        fs::write(&tmp, text.as_bytes()).map_err(|source| SyncError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(true)
    }
}
