use crate::error::StoreError;
use crate::models::Document;
use crate::stores::{FlatL2Index, Metric};
use crate::traits::VectorIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const INDEX_FILE: &str = "statements.index";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.f32";
pub const MANIFEST_FILE: &str = "manifest.json";

const INDEX_MAGIC: &[u8; 4] = b"SSIX";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactChecksums {
    pub index: String,
    pub documents: String,
    pub embeddings: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleManifest {
    pub format_version: u32,
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub model: String,
    pub dimension: usize,
    pub count: usize,
    pub checksums: ArtifactChecksums,
}

#[derive(Debug)]
pub struct LoadedIndex {
    pub documents: Vec<Document>,
    pub index: FlatL2Index,
    pub manifest: Option<BundleManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    Absent,
    Ready,
    Corrupt(String),
}

/// Reads and writes the index bundle under one directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes all artifacts into a staging directory inside the bundle
    /// directory, then renames each file into place with the manifest last.
    /// Other files in the directory are left alone.
    pub fn save(
        &self,
        documents: &[Document],
        embeddings: &[Vec<f32>],
        index: &FlatL2Index,
        model: &str,
    ) -> Result<BundleManifest, StoreError> {
        if documents.len() != embeddings.len() || documents.len() != index.len() {
            return Err(StoreError::CorruptIndex(format!(
                "refusing to save {} documents with {} embeddings and {} indexed vectors",
                documents.len(),
                embeddings.len(),
                index.len()
            )));
        }

        let index_bytes = encode_index(index);
        let documents_bytes = serde_json::to_vec_pretty(documents)?;
        let embeddings_bytes = encode_embeddings(embeddings, index.dimension());

        let manifest = BundleManifest {
            format_version: FORMAT_VERSION,
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            model: model.to_string(),
            dimension: index.dimension(),
            count: index.len(),
            checksums: ArtifactChecksums {
                index: sha256_hex(&index_bytes),
                documents: sha256_hex(&documents_bytes),
                embeddings: sha256_hex(&embeddings_bytes),
            },
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

        fs::create_dir_all(&self.dir)?;
        let staging = self.dir.join(format!(".staging-{}", manifest.build_id));

        let written = (|| -> io::Result<()> {
            fs::create_dir(&staging)?;
            let artifacts = [
                (INDEX_FILE, &index_bytes),
                (DOCUMENTS_FILE, &documents_bytes),
                (EMBEDDINGS_FILE, &embeddings_bytes),
                (MANIFEST_FILE, &manifest_bytes),
            ];
            for (name, bytes) in artifacts {
                fs::write(staging.join(name), bytes)?;
            }
            for (name, _) in artifacts {
                fs::rename(staging.join(name), self.dir.join(name))?;
            }
            Ok(())
        })();

        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            debug!(path = %staging.display(), %cleanup, "staging directory not removed");
        }
        written?;

        info!(
            dir = %self.dir.display(),
            count = manifest.count,
            dimension = manifest.dimension,
            "saved index bundle"
        );
        Ok(manifest)
    }

    pub fn load(&self) -> Result<LoadedIndex, StoreError> {
        let index_path = self.dir.join(INDEX_FILE);
        let documents_path = self.dir.join(DOCUMENTS_FILE);
        for required in [&index_path, &documents_path] {
            if !required.is_file() {
                return Err(StoreError::MissingIndex(required.display().to_string()));
            }
        }

        let index_bytes = fs::read(&index_path)?;
        let documents_bytes = fs::read(&documents_path)?;
        let embeddings_path = self.dir.join(EMBEDDINGS_FILE);
        if !embeddings_path.is_file() {
            return Err(StoreError::CorruptIndex(format!(
                "{} is missing next to the index",
                EMBEDDINGS_FILE
            )));
        }
        let embeddings_bytes = fs::read(&embeddings_path)?;

        let index = decode_index(&index_bytes)?;
        let documents: Vec<Document> = serde_json::from_slice(&documents_bytes)
            .map_err(|error| StoreError::CorruptIndex(format!("{DOCUMENTS_FILE}: {error}")))?;
        let (embeddings, embedding_dimension) = decode_embeddings(&embeddings_bytes)?;
        let embedding_count = embeddings.len();

        if documents.len() != index.len() || embedding_count != index.len() {
            return Err(StoreError::CorruptIndex(format!(
                "{} documents, {} embeddings and {} indexed vectors disagree",
                documents.len(),
                embedding_count,
                index.len()
            )));
        }
        if embedding_dimension != index.dimension() {
            return Err(StoreError::CorruptIndex(format!(
                "embeddings have dimension {embedding_dimension}, index has {}",
                index.dimension()
            )));
        }

        let manifest = self.read_manifest()?;
        if let Some(manifest) = &manifest {
            verify_manifest(
                manifest,
                &index,
                [
                    index_bytes.as_slice(),
                    documents_bytes.as_slice(),
                    embeddings_bytes.as_slice(),
                ],
            )?;
        }

        debug!(dir = %self.dir.display(), count = index.len(), "loaded index bundle");
        Ok(LoadedIndex {
            documents,
            index,
            manifest,
        })
    }

    /// The raw embedding rows as saved, in ordinal order.
    pub fn load_embeddings(&self) -> Result<Vec<Vec<f32>>, StoreError> {
        let path = self.dir.join(EMBEDDINGS_FILE);
        if !path.is_file() {
            return Err(StoreError::MissingIndex(path.display().to_string()));
        }
        Ok(decode_embeddings(&fs::read(path)?)?.0)
    }

    pub fn probe(&self) -> BundleStatus {
        self.open().0
    }

    /// Classifies the bundle and hands back the loaded index when it is ready,
    /// reading the directory once.
    pub fn open(&self) -> (BundleStatus, Option<LoadedIndex>) {
        let index_exists = self.dir.join(INDEX_FILE).exists();
        let documents_exist = self.dir.join(DOCUMENTS_FILE).exists();
        if !index_exists && !documents_exist {
            return (BundleStatus::Absent, None);
        }

        match self.load() {
            Ok(loaded) => (BundleStatus::Ready, Some(loaded)),
            Err(error) => (BundleStatus::Corrupt(error.to_string()), None),
        }
    }

    fn read_manifest(&self) -> Result<Option<BundleManifest>, StoreError> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let manifest = serde_json::from_slice(&fs::read(path)?)
            .map_err(|error| StoreError::CorruptIndex(format!("{MANIFEST_FILE}: {error}")))?;
        Ok(Some(manifest))
    }
}

fn verify_manifest(
    manifest: &BundleManifest,
    index: &FlatL2Index,
    [index_bytes, documents_bytes, embeddings_bytes]: [&[u8]; 3],
) -> Result<(), StoreError> {
    if manifest.count != index.len() || manifest.dimension != index.dimension() {
        return Err(StoreError::CorruptIndex(format!(
            "manifest describes {} vectors of dimension {}, found {} of dimension {}",
            manifest.count,
            manifest.dimension,
            index.len(),
            index.dimension()
        )));
    }

    let checks = [
        (INDEX_FILE, &manifest.checksums.index, index_bytes),
        (DOCUMENTS_FILE, &manifest.checksums.documents, documents_bytes),
        (EMBEDDINGS_FILE, &manifest.checksums.embeddings, embeddings_bytes),
    ];
    for (file, expected, bytes) in checks {
        if sha256_hex(bytes) != *expected {
            return Err(StoreError::CorruptIndex(format!("{file} checksum mismatch")));
        }
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn encode_index(index: &FlatL2Index) -> Vec<u8> {
    let data = index.as_flat();
    let mut bytes = Vec::with_capacity(21 + data.len() * 4);
    bytes.extend_from_slice(INDEX_MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(index.metric().tag());
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    for value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn encode_embeddings(embeddings: &[Vec<f32>], dimension: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12 + embeddings.len() * dimension * 4);
    bytes.extend_from_slice(&(embeddings.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(dimension as u32).to_le_bytes());
    for value in embeddings.iter().flatten() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

struct Reader<'a> {
    bytes: &'a [u8],
    file: &'static str,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StoreError> {
        if self.bytes.len() < len {
            return Err(StoreError::CorruptIndex(format!("{} is truncated", self.file)));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StoreError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, StoreError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn floats(&mut self, count: usize) -> Result<Vec<f32>, StoreError> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| StoreError::CorruptIndex(format!("{} header overflows", self.file)))?;
        let raw = self.take(len)?;
        if !self.bytes.is_empty() {
            return Err(StoreError::CorruptIndex(format!("{} has trailing bytes", self.file)));
        }
        Ok(raw
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

fn decode_index(bytes: &[u8]) -> Result<FlatL2Index, StoreError> {
    let mut reader = Reader {
        bytes,
        file: INDEX_FILE,
    };
    if &reader.array::<4>()? != INDEX_MAGIC {
        return Err(StoreError::CorruptIndex(format!("{INDEX_FILE} has the wrong magic")));
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(StoreError::CorruptIndex(format!(
            "{INDEX_FILE} has unsupported format version {version}"
        )));
    }
    let [tag] = reader.array::<1>()?;
    if Metric::from_tag(tag) != Some(Metric::SquaredL2) {
        return Err(StoreError::CorruptIndex(format!("{INDEX_FILE} has unknown metric {tag}")));
    }
    let dimension = reader.u32()? as usize;
    let count = reader.u64()? as usize;
    let total = count
        .checked_mul(dimension)
        .ok_or_else(|| StoreError::CorruptIndex(format!("{INDEX_FILE} header overflows")))?;
    let data = reader.floats(total)?;

    FlatL2Index::from_flat(dimension, data)
        .map_err(|error| StoreError::CorruptIndex(format!("{INDEX_FILE}: {error}")))
}

/// Rows and their declared dimension.
fn decode_embeddings(bytes: &[u8]) -> Result<(Vec<Vec<f32>>, usize), StoreError> {
    let mut reader = Reader {
        bytes,
        file: EMBEDDINGS_FILE,
    };
    let count = reader.u64()? as usize;
    let dimension = reader.u32()? as usize;
    let total = count
        .checked_mul(dimension)
        .ok_or_else(|| StoreError::CorruptIndex(format!("{EMBEDDINGS_FILE} header overflows")))?;
    let data = reader.floats(total)?;
    if dimension == 0 {
        return Ok((vec![Vec::new(); count], dimension));
    }
    Ok((
        data.chunks_exact(dimension).map(<[f32]>::to_vec).collect(),
        dimension,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, TableShape};
    use tempfile::tempdir;

    fn document(page: u32, content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocumentMetadata {
                source: "data/march.pdf".to_string(),
                page,
                kind: "statement".to_string(),
                has_tables: page == 2,
                table_count: usize::from(page == 2),
                link_count: 0,
                tables: if page == 2 {
                    vec![TableShape {
                        row_count: 4,
                        col_count: 3,
                    }]
                } else {
                    Vec::new()
                },
                chunk: None,
            },
        }
    }

    fn sample() -> (Vec<Document>, Vec<Vec<f32>>, FlatL2Index) {
        let documents = vec![
            document(1, "Statement period March"),
            document(2, "Order 1 Biryani 310.00"),
            document(3, "Refund policy"),
        ];
        let embeddings = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        let mut index = FlatL2Index::new(3);
        index.add(&embeddings).expect("dimensions match");
        (documents, embeddings, index)
    }

    #[test]
    fn save_then_load_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (documents, embeddings, index) = sample();

        let manifest = store.save(&documents, &embeddings, &index, "nomic-embed-text")?;
        let loaded = store.load()?;

        assert_eq!(loaded.documents, documents);
        assert_eq!(loaded.index, index);
        assert_eq!(loaded.manifest, Some(manifest));
        assert_eq!(store.load_embeddings()?, embeddings);

        let hits = loaded.index.search(&embeddings[1], 1)?;
        assert_eq!(hits[0].ordinal, 1);
        assert!(hits[0].distance.abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn empty_bundle_is_saved_and_loaded() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("empty"));
        store.save(&[], &[], &FlatL2Index::new(8), "nomic-embed-text")?;

        let loaded = store.load()?;
        assert!(loaded.documents.is_empty());
        assert!(loaded.index.is_empty());
        assert_eq!(store.probe(), BundleStatus::Ready);
        Ok(())
    }

    #[test]
    fn saving_again_replaces_the_bundle() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (documents, embeddings, index) = sample();
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;

        let mut smaller = FlatL2Index::new(3);
        smaller.add(&embeddings[..1])?;
        store.save(&documents[..1], &embeddings[..1], &smaller, "nomic-embed-text")?;

        assert_eq!(store.load()?.documents.len(), 1);
        let mut names = fs::read_dir(store.dir())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec![DOCUMENTS_FILE, EMBEDDINGS_FILE, MANIFEST_FILE, INDEX_FILE]);
        Ok(())
    }

    #[test]
    fn saving_keeps_unrelated_files_in_the_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().to_path_buf());
        fs::write(dir.path().join("march.pdf"), b"%PDF-1.4\n%statement")?;
        fs::create_dir(dir.path().join("notes"))?;
        fs::write(dir.path().join("notes").join("todo.txt"), b"call bank")?;
        let (documents, embeddings, index) = sample();

        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;

        assert_eq!(fs::read(dir.path().join("march.pdf"))?, b"%PDF-1.4\n%statement");
        assert_eq!(fs::read(dir.path().join("notes").join("todo.txt"))?, b"call bank");
        assert_eq!(store.load()?.documents, documents);
        assert!(!fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with(".staging")));
        Ok(())
    }

    #[test]
    fn missing_files_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        assert!(matches!(store.load(), Err(StoreError::MissingIndex(_))));
        assert_eq!(store.probe(), BundleStatus::Absent);

        let (documents, embeddings, index) = sample();
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;
        fs::remove_file(store.dir().join(DOCUMENTS_FILE))?;

        assert!(matches!(store.load(), Err(StoreError::MissingIndex(_))));
        assert!(matches!(store.probe(), BundleStatus::Corrupt(_)));
        Ok(())
    }

    #[test]
    fn disagreeing_lengths_are_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (documents, embeddings, index) = sample();
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;

        fs::write(
            store.dir().join(DOCUMENTS_FILE),
            serde_json::to_vec(&documents[..2])?,
        )?;
        fs::remove_file(store.dir().join(MANIFEST_FILE))?;

        assert!(matches!(store.load(), Err(StoreError::CorruptIndex(_))));
        Ok(())
    }

    #[test]
    fn tampered_artifact_fails_checksum() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (mut documents, embeddings, index) = sample();
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;

        documents[0].content = "edited after the build".to_string();
        fs::write(
            store.dir().join(DOCUMENTS_FILE),
            serde_json::to_vec_pretty(&documents)?,
        )?;

        match store.load() {
            Err(StoreError::CorruptIndex(reason)) => assert!(reason.contains("checksum")),
            other => panic!("expected a checksum failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn truncated_index_is_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (documents, embeddings, index) = sample();
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;

        let path = store.dir().join(INDEX_FILE);
        let bytes = fs::read(&path)?;
        fs::write(&path, &bytes[..bytes.len() - 3])?;

        assert!(matches!(store.load(), Err(StoreError::CorruptIndex(_))));
        Ok(())
    }

    #[test]
    fn truncated_embeddings_without_manifest_are_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (documents, embeddings, index) = sample();
        store.save(&documents, &embeddings, &index, "nomic-embed-text")?;
        fs::remove_file(store.dir().join(MANIFEST_FILE))?;

        let path = store.dir().join(EMBEDDINGS_FILE);
        let bytes = fs::read(&path)?;
        fs::write(&path, &bytes[..12])?;

        assert!(matches!(store.load(), Err(StoreError::CorruptIndex(_))));
        assert!(matches!(store.probe(), BundleStatus::Corrupt(_)));
        Ok(())
    }

    #[test]
    fn mismatched_inputs_are_not_saved() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));
        let (documents, embeddings, index) = sample();

        let result = store.save(&documents[..2], &embeddings, &index, "nomic-embed-text");
        assert!(result.is_err());
        assert!(!store.dir().exists());
        Ok(())
    }
}
