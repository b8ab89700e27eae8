//! Part catalog registry.

use geneforge_core::{Part, PartId, PartRole};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Errors raised while loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two parts share an id
    #[error("duplicate part id: {0}")]
    DuplicatePart(PartId),

    /// A part has unusable parameters
    #[error("invalid part: {0}")]
    InvalidPart(String),

    /// A UCF record could not be mapped to a part
    #[error("UCF error: {0}")]
    Ucf(String),

    /// Two catalogs share a library id
    #[error("duplicate library: {0}")]
    DuplicateLibrary(String),
}

/// On-disk catalog layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Library identifier (e.g. `Eco1C1G1T1`)
    pub library: String,
    /// Characterized parts
    pub parts: Vec<Part>,
}

/// Read-only part index.
#[derive(Debug, Clone)]
pub struct PartCatalog {
    library: String,
    parts: HashMap<PartId, Part>,
    by_role: HashMap<(String, PartRole), Vec<PartId>>,
}

impl PartCatalog {
    /// Build a catalog, rejecting duplicate ids and invalid parameters.
    pub fn new(library: impl Into<String>, parts: Vec<Part>) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            library: library.into(),
            parts: HashMap::new(),
            by_role: HashMap::new(),
        };

        for part in parts {
            part.check_parameters().map_err(CatalogError::InvalidPart)?;
            if catalog.parts.contains_key(&part.id) {
                return Err(CatalogError::DuplicatePart(part.id));
            }
            catalog
                .by_role
                .entry((organism_key(&part.organism), part.role()))
                .or_default()
                .push(part.id.clone());
            catalog.parts.insert(part.id.clone(), part);
        }

        for ids in catalog.by_role.values_mut() {
            ids.sort();
        }
        Ok(catalog)
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.library, file.parts)
    }

    /// Load a catalog file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(
            "Loaded part library {} ({} parts) from {}",
            catalog.library,
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Build a catalog from UCF text plus optional input/output companions.
    pub fn from_ucf(library: &str, documents: &[&str]) -> Result<Self, CatalogError> {
        crate::ucf::parse_ucf(library, documents)
    }

    /// Load `<dir>/<library>.UCF.json` with its `.input.json` and
    /// `.output.json` siblings when present.
    pub async fn load_ucf(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let library = name
            .strip_suffix(UCF_SUFFIX)
            .ok_or_else(|| CatalogError::Ucf(format!("{} is not a *{} file", path.display(), UCF_SUFFIX)))?;

        let mut documents = vec![tokio::fs::read_to_string(path).await?];
        for suffix in [".input.json", ".output.json"] {
            let sibling = path.with_file_name(format!("{}{}", library, suffix));
            if tokio::fs::try_exists(&sibling).await? {
                documents.push(tokio::fs::read_to_string(&sibling).await?);
            }
        }

        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();
        let catalog = Self::from_ucf(library, &texts)?;
        tracing::info!(
            "Loaded UCF library {} ({} parts) from {}",
            catalog.library,
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Library identifier.
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Look up a part.
    pub fn get(&self, id: &PartId) -> Option<&Part> {
        self.parts.get(id)
    }

    /// Parts for an organism and role, ordered by id.
    pub fn by_role(&self, organism: &str, role: PartRole) -> Vec<&Part> {
        self.by_role
            .get(&(organism_key(organism), role))
            .into_iter()
            .flat_map(|ids| ids.iter().filter_map(|id| self.parts.get(id)))
            .collect()
    }

    /// All parts ordered by id.
    pub fn list(&self) -> Vec<&Part> {
        let mut parts: Vec<&Part> = self.parts.values().collect();
        parts.sort_by(|a, b| a.id.cmp(&b.id));
        parts
    }

    /// Distinct organisms, as written in the first part seen for each.
    pub fn organisms(&self) -> Vec<String> {
        let mut seen: HashMap<String, String> = HashMap::new();
        for part in self.list() {
            seen.entry(organism_key(&part.organism))
                .or_insert_with(|| part.organism.clone());
        }
        let mut out: Vec<String> = seen.into_values().collect();
        out.sort();
        out
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Export in the on-disk layout.
    pub fn to_file(&self) -> CatalogFile {
        CatalogFile {
            library: self.library.clone(),
            parts: self.list().into_iter().cloned().collect(),
        }
    }
}

const UCF_SUFFIX: &str = ".UCF.json";

/// Catalogs keyed by library id.
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    catalogs: BTreeMap<String, PartCatalog>,
}

impl CatalogSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a catalog under its library id.
    pub fn insert(&mut self, catalog: PartCatalog) -> Result<(), CatalogError> {
        if self.catalogs.contains_key(catalog.library()) {
            return Err(CatalogError::DuplicateLibrary(catalog.library().to_string()));
        }
        tracing::debug!("Registered part library {}", catalog.library());
        self.catalogs.insert(catalog.library().to_string(), catalog);
        Ok(())
    }

    /// Add a catalog, replacing any with the same library id.
    pub fn with(mut self, catalog: PartCatalog) -> Self {
        self.catalogs.insert(catalog.library().to_string(), catalog);
        self
    }

    /// Look up a library.
    pub fn get(&self, library: &str) -> Option<&PartCatalog> {
        self.catalogs.get(library)
    }

    /// Library ids in order.
    pub fn libraries(&self) -> Vec<&str> {
        self.catalogs.keys().map(String::as_str).collect()
    }

    /// Catalogs in library order.
    pub fn iter(&self) -> impl Iterator<Item = &PartCatalog> {
        self.catalogs.values()
    }

    /// Number of libraries.
    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    /// Whether no library is registered.
    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    /// Load every library in `dir`: `*.UCF.json` files (with their input
    /// and output companions) and catalog `*.json` files. Companion files
    /// are not loaded on their own.
    pub async fn scan(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut set = Self::new();
        for path in paths {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.ends_with(UCF_SUFFIX) {
                set.insert(PartCatalog::load_ucf(&path).await?)?;
            } else if name.ends_with(".input.json") || name.ends_with(".output.json") {
                continue;
            } else if name.ends_with(".json") {
                set.insert(PartCatalog::load(&path).await?)?;
            }
        }

        tracing::info!("Found {} part libraries in {}", set.len(), dir.display());
        Ok(set)
    }
}

impl From<PartCatalog> for CatalogSet {
    fn from(catalog: PartCatalog) -> Self {
        Self::new().with(catalog)
    }
}

/// `E. coli`, `e.coli` and `E coli` all index the same organism.
fn organism_key(organism: &str) -> String {
    organism
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::{Expression, PartKind};

    fn reporter(id: &str, organism: &str) -> Part {
        Part {
            id: PartId::new(id),
            name: id.to_string(),
            organism: organism.to_string(),
            kind: PartKind::Reporter { protein: "GFP".into() },
            expression: Expression::default(),
            sequence: None,
        }
    }

    #[test]
    fn test_lookup_by_role_is_organism_scoped_and_sorted() {
        let catalog = PartCatalog::new("lib", vec![
            reporter("b_gfp", "E. coli"),
            reporter("a_gfp", "e.coli"),
            reporter("y_gfp", "S. cerevisiae"),
        ]).unwrap();

        let ecoli: Vec<_> = catalog.by_role("E coli", PartRole::Reporter).iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ecoli, vec!["a_gfp", "b_gfp"]);
        assert!(catalog.by_role("E. coli", PartRole::Gate).is_empty());
        assert_eq!(catalog.organisms().len(), 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = PartCatalog::new("lib", vec![reporter("x", "E. coli"), reporter("x", "E. coli")]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicatePart(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.json");
        let file = CatalogFile { library: "tiny".into(), parts: vec![reporter("gfp", "E. coli")] };
        tokio::fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).await.unwrap();

        let catalog = PartCatalog::load(&path).await.unwrap();
        assert_eq!(catalog.library(), "tiny");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(&PartId::new("gfp")).is_some());
    }

    #[tokio::test]
    async fn test_scan_directory_of_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let plain = CatalogFile { library: "tiny".into(), parts: vec![reporter("gfp", "E. coli")] };
        tokio::fs::write(dir.path().join("tiny.json"), serde_json::to_string(&plain).unwrap()).await.unwrap();
        tokio::fs::write(
            dir.path().join("SC1C1G1T1.UCF.json"),
            r#"[{"collection": "gates", "name": "R1_PsrA", "regulator": "PsrA", "model": "m"},
                {"collection": "models", "name": "m", "parameters": [
                    {"name": "ymax", "value": 5.2}, {"name": "ymin", "value": 0.2},
                    {"name": "K", "value": 0.18}, {"name": "n", "value": 2.0}]}]"#,
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.path().join("SC1C1G1T1.output.json"),
            r#"[{"collection": "output_devices", "name": "RFP_reporter"}]"#,
        )
        .await
        .unwrap();

        let set = CatalogSet::scan(dir.path()).await.unwrap();
        assert_eq!(set.libraries(), vec!["SC1C1G1T1", "tiny"]);

        let yeast = set.get("SC1C1G1T1").unwrap();
        assert_eq!(yeast.len(), 2);
        assert_eq!(yeast.by_role("S. cerevisiae", PartRole::Reporter).len(), 1);
        assert!(set.get("Eco1C1G1T1").is_none());
    }

    #[test]
    fn test_duplicate_library_rejected() {
        let tiny = || PartCatalog::new("tiny", vec![reporter("gfp", "E. coli")]).unwrap();
        let mut set = CatalogSet::from(tiny());
        assert!(matches!(set.insert(tiny()), Err(CatalogError::DuplicateLibrary(_))));
        assert_eq!(set.len(), 1);
    }
}
