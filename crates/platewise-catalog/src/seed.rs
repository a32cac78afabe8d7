//! Built-in dataset shipped with the binary.

use std::fs;
use std::path::Path;

use platewise_types::PlateError;
use tracing::info;

use crate::catalog::Catalog;

/// The 20-dish sample catalog, embedded at compile time.
pub const DEFAULT_CATALOG_CSV: &str = include_str!("../data/dishes.csv");

/// Parse the embedded dataset.
pub fn default_catalog() -> Result<Catalog, PlateError> {
    Catalog::from_reader(DEFAULT_CATALOG_CSV.as_bytes())
}

/// Write the embedded dataset to `path` unless a file already exists there.
///
/// Returns `true` when a new file was written.  Missing parent directories
/// are created.
pub fn ensure_catalog_file(path: impl AsRef<Path>) -> Result<bool, PlateError> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            PlateError::DataLoad(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    fs::write(path, DEFAULT_CATALOG_CSV)
        .map_err(|e| PlateError::DataLoad(format!("cannot write {}: {e}", path.display())))?;
    info!(path = %path.display(), "wrote default catalog");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_dataset_parses() {
        let catalog = default_catalog().unwrap();
        assert_eq!(catalog.len(), 20);
        let thali = catalog.get("D020").unwrap();
        assert!(thali.description.contains("dal, vegetables"));
        assert!(thali.tags.contains("Complete Meal"));
        assert_eq!(catalog.all()[0].id, "D001");
    }

    #[test]
    fn ensure_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dishes.csv");
        assert!(ensure_catalog_file(&path).unwrap());
        assert!(!ensure_catalog_file(&path).unwrap());
        assert_eq!(Catalog::load(&path).unwrap().len(), 20);
    }

    #[test]
    fn ensure_leaves_existing_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dishes.csv");
        fs::write(&path, "id,name,cuisine,price,rating,dietary_tags,description\n").unwrap();
        assert!(!ensure_catalog_file(&path).unwrap());
        assert!(Catalog::load(&path).unwrap().is_empty());
    }
}
