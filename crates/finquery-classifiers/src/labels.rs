//! Index to label mapping saved next to a fine-tuned checkpoint

use finquery_core::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct LabelMapFile {
    /// JSON object keys are strings, so ids arrive as "0", "1", ...
    id2label: HashMap<String, String>,

    #[serde(default)]
    label2id: Option<HashMap<String, usize>>,
}

/// Bidirectional mapping between class indices and label names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// Build from labels ordered by class index
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::artifact("Label map is empty"));
        }

        let mut seen = HashMap::with_capacity(labels.len());
        for (idx, label) in labels.iter().enumerate() {
            if let Some(prev) = seen.insert(label.as_str(), idx) {
                return Err(Error::artifact(format!(
                    "Label '{}' appears at both index {} and {}",
                    label, prev, idx
                )));
            }
        }

        Ok(Self { labels })
    }

    /// Parse an `{"id2label": {...}, "label2id": {...}}` document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: LabelMapFile = serde_json::from_str(json)
            .map_err(|e| Error::artifact(format!("Failed to parse label map: {}", e)))?;

        let mut indexed = Vec::with_capacity(file.id2label.len());
        for (key, label) in file.id2label {
            let idx: usize = key.trim().parse().map_err(|_| {
                Error::artifact(format!("Label id '{}' is not a non-negative integer", key))
            })?;
            indexed.push((idx, label));
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        if let Some((pos, (idx, _))) = indexed
            .iter()
            .enumerate()
            .find(|(pos, (idx, _))| pos != idx)
        {
            return Err(Error::artifact(format!(
                "Label ids must be contiguous from 0, found {} at position {}",
                idx, pos
            )));
        }

        let map = Self::new(indexed.into_iter().map(|(_, label)| label).collect())?;

        if let Some(label2id) = file.label2id {
            if label2id.len() != map.len() {
                return Err(Error::artifact(format!(
                    "label2id has {} entries but id2label has {}",
                    label2id.len(),
                    map.len()
                )));
            }
            for (label, idx) in &label2id {
                if map.get(*idx) != Some(label.as_str()) {
                    return Err(Error::artifact(format!(
                        "label2id maps '{}' to {} which id2label does not agree with",
                        label, idx
                    )));
                }
            }
        }

        Ok(map)
    }

    /// Read a label map document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::artifact(format!(
                "Label map not found: {}",
                path.display()
            )));
        }

        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::artifact(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Label for a class index
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    /// Class index for a label
    pub fn id_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
