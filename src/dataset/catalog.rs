//! Species Catalog
//!
//! The catalog is the single source of truth for the label space: the sorted
//! list of class directory names, where a label's position is its class id.
//! It is persisted next to every checkpoint so a model and the labels it was
//! trained against always travel together.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::utils::error::{Error, Result};

/// Ordered, deduplicated species label list.
///
/// Class id `i` is the i-th name in lexicographic order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeciesCatalog {
    names: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SpeciesCatalog {
    /// Build a catalog from a list of class names (sorted and deduplicated).
    pub fn new(mut names: Vec<String>) -> Result<Self> {
        names.sort();
        names.dedup();
        if names.is_empty() {
            return Err(Error::Dataset("catalog has no classes".to_string()));
        }
        let index = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Ok(Self { names, index })
    }

    /// Scan the immediate subdirectories of a dataset root.
    ///
    /// Fails if the root has no class directories or if any class directory
    /// contains no images: an empty class would silently shift every
    /// subsequent class id.
    pub fn from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(Error::PathNotFound(root.to_path_buf()));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                // Dropping a class here would shift every later class id
                match entry.file_name().to_str() {
                    Some(name) => names.push(name.to_string()),
                    None => {
                        return Err(Error::Dataset(format!(
                            "class directory name {:?} is not valid UTF-8",
                            entry.file_name()
                        )))
                    }
                }
            }
        }
        names.sort();

        if names.is_empty() {
            return Err(Error::Dataset(format!(
                "no class directories found under {:?}",
                root
            )));
        }

        for name in &names {
            let class_dir = root.join(name);
            let has_images = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .any(|e| super::is_image_file(e.path()));
            if !has_images {
                return Err(Error::Dataset(format!(
                    "class directory '{}' contains no images",
                    name
                )));
            }
        }

        info!("Catalog: {} species", names.len());
        Self::new(names)
    }

    /// Rebuild the name -> id index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of a class id
    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(|s| s.as_str())
    }

    /// Class id of a name
    pub fn id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All names in id order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn make_class_dir(root: &Path, name: &str, images: usize) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..images {
            File::create(dir.join(format!("img_{}.jpg", i))).unwrap();
        }
    }

    #[test]
    fn test_catalog_sorted_ids() {
        let tmp = tempfile::tempdir().unwrap();
        make_class_dir(tmp.path(), "theraphosa_blondi", 2);
        make_class_dir(tmp.path(), "avicularia_avicularia", 1);
        make_class_dir(tmp.path(), "poecilotheria_metallica", 3);

        let catalog = SpeciesCatalog::from_dir(tmp.path()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.name(0), Some("avicularia_avicularia"));
        assert_eq!(catalog.name(1), Some("poecilotheria_metallica"));
        assert_eq!(catalog.name(2), Some("theraphosa_blondi"));
        assert_eq!(catalog.id("theraphosa_blondi"), Some(2));
    }

    #[test]
    fn test_catalog_stable_across_rescans() {
        let tmp = tempfile::tempdir().unwrap();
        make_class_dir(tmp.path(), "b_class", 1);
        make_class_dir(tmp.path(), "a_class", 1);

        let first = SpeciesCatalog::from_dir(tmp.path()).unwrap();
        let second = SpeciesCatalog::from_dir(tmp.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(SpeciesCatalog::from_dir(tmp.path()).is_err());
    }

    #[test]
    fn test_empty_class_fails() {
        let tmp = tempfile::tempdir().unwrap();
        make_class_dir(tmp.path(), "grammostola_rosea", 2);
        fs::create_dir_all(tmp.path().join("empty_species")).unwrap();

        let err = SpeciesCatalog::from_dir(tmp.path()).unwrap_err();
        assert!(format!("{}", err).contains("empty_species"));
    }

    #[test]
    #[cfg(unix)]
    fn test_non_utf8_class_dir_fails() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        make_class_dir(tmp.path(), "avicularia_avicularia", 1);
        let bad_name = OsStr::from_bytes(b"brachypelma_\xff_hamorii");
        fs::create_dir_all(tmp.path().join(bad_name)).unwrap();

        let err = SpeciesCatalog::from_dir(tmp.path()).unwrap_err();
        assert!(format!("{}", err).contains("not valid UTF-8"));
    }

    #[test]
    fn test_serde_round_trip_rebuilds_index() {
        let catalog =
            SpeciesCatalog::new(vec!["b".to_string(), "a".to_string(), "a".to_string()]).unwrap();
        let json = serde_json::to_string(&catalog).unwrap();
        let mut restored: SpeciesCatalog = serde_json::from_str(&json).unwrap();
        restored.rebuild_index();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.id("b"), Some(1));
    }
}
