//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tiku_ingest::models::{Catalog, ExtractionField, GroupSpec};
use tiku_ingest::services::{
    AssetResolver, CheckpointStore, ConsensusVoter, ConvergenceDriver, DriverConfig, ExtractError,
    Extractor, Normalizer, RawCandidate, DEFAULT_MIN_LENGTH,
};

/// Deterministic extractor: answers with text derived from the image bytes.
/// Corpus files written by `write_corpus` contain their item key, so every
/// item gets a unique, stable value: strong consensus on every item.
pub struct EchoExtractor {
    calls: AtomicU32,
}

impl EchoExtractor {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Extractor for EchoExtractor {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn extract(&self, image: &[u8], _prompt: &str) -> Result<RawCandidate, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = String::from_utf8_lossy(image);
        Ok(RawCandidate {
            text: Some(format!("第{}号练习，看图口算并记录用时", key)),
            refused: false,
        })
    }
}

/// Always refuses; no item ever converges
pub struct RefusingExtractor;

#[async_trait::async_trait]
impl Extractor for RefusingExtractor {
    fn name(&self) -> &'static str {
        "refusing"
    }

    async fn extract(&self, _image: &[u8], _prompt: &str) -> Result<RawCandidate, ExtractError> {
        Ok(RawCandidate {
            text: None,
            refused: true,
        })
    }
}

/// Answers like `EchoExtractor` for odd exercise indexes and refuses even
/// ones, leaving a predictable half of the catalog incomplete
pub struct OddOnlyExtractor;

#[async_trait::async_trait]
impl Extractor for OddOnlyExtractor {
    fn name(&self) -> &'static str {
        "odd_only"
    }

    async fn extract(&self, image: &[u8], _prompt: &str) -> Result<RawCandidate, ExtractError> {
        let key = String::from_utf8_lossy(image);
        let index: u32 = key
            .split('-')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        if index % 2 == 0 {
            return Ok(RawCandidate {
                text: None,
                refused: true,
            });
        }

        Ok(RawCandidate {
            text: Some(format!("第{}号练习，看图口算并记录用时", key)),
            refused: false,
        })
    }
}

/// Single-group catalog: group 1 with `count` items in folder level01
pub fn small_catalog(count: u32) -> Catalog {
    let mut groups = BTreeMap::new();
    groups.insert(
        1,
        GroupSpec {
            item_count: count,
            folder_name: "level01".to_string(),
        },
    );
    Catalog::new(groups).unwrap()
}

/// Write a fake image corpus under `root`: one folder per group, one file
/// per item whose bytes are the item key (so stub extractors can identify
/// the item they were shown)
pub fn write_corpus(root: &Path, catalog: &Catalog) {
    for (group, spec) in catalog.groups() {
        let folder = root.join(&spec.folder_name);
        std::fs::create_dir_all(&folder).unwrap();
        for index in 1..=spec.item_count {
            let file_name = format!("{}_{:02}.jpg", spec.folder_name, index + 1);
            std::fs::write(folder.join(file_name), format!("{}-{}", group, index)).unwrap();
        }
    }
}

/// Assemble a driver over the given corpus root and extractor
pub fn build_driver(
    root: &Path,
    catalog: &Catalog,
    extractor: Arc<dyn Extractor>,
    config: DriverConfig,
) -> ConvergenceDriver {
    let field = ExtractionField::Description;
    let normalizer = Normalizer::new(field, DEFAULT_MIN_LENGTH);
    let voter = ConsensusVoter::new(extractor, normalizer.clone(), 2);
    let store = CheckpointStore::load(root.join(field.store_file()), 1).unwrap();
    let resolver = AssetResolver::new(root, catalog.clone());

    ConvergenceDriver::new(
        field,
        catalog.clone(),
        resolver,
        store,
        voter,
        normalizer,
        config,
    )
}

/// Read the checkpoint file back as a plain map
pub fn read_store(root: &Path) -> BTreeMap<String, String> {
    let path = root.join(ExtractionField::Description.store_file());
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap(),
        Err(_) => BTreeMap::new(),
    }
}
