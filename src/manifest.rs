use crate::error::{DatasetError, DatasetResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A single labeled image as exported by the labeling tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "External ID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_id: Option<String>,
    #[serde(rename = "Labeled Data")]
    pub image_url: String,
    #[serde(rename = "Label", default)]
    pub label: Label,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub objects: Vec<LabelObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelObject {
    #[serde(rename = "instanceURI")]
    pub mask_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ManifestEntry {
    pub fn mask_urls(&self) -> impl Iterator<Item = &str> {
        self.label.objects.iter().map(|obj| obj.mask_url.as_str())
    }

    /// Human readable name used in logs.
    pub fn display_name(&self) -> &str {
        self.external_id
            .as_deref()
            .or_else(|| self.id.as_deref())
            .unwrap_or_else(|| self.image_url.as_str())
    }
}

/// The full list of entries, loaded once and never modified afterwards.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> DatasetResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_reader(BufReader::new(file)).map_err(|err| match err {
            DatasetError::ManifestJson { source, .. } => DatasetError::ManifestJson {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            "Loaded manifest {} with {} entries ({} instances)",
            path.display(),
            manifest.len(),
            manifest.instance_count()
        );
        Ok(manifest)
    }

    pub fn from_reader<R: Read>(reader: R) -> DatasetResult<Self> {
        let entries = serde_json::from_reader(reader).map_err(|source| {
            DatasetError::ManifestJson {
                path: Default::default(),
                source,
            }
        })?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> DatasetResult<&ManifestEntry> {
        self.entries
            .get(index)
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn instance_count(&self) -> usize {
        self.entries.iter().map(|e| e.label.objects.len()).sum()
    }
}
