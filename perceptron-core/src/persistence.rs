//! # Persistência do Modelo
//!
//! O perceptron não sabe onde nem como os parâmetros são gravados: ele produz um
//! [`ModelRecord`] e delega a escrita a um backend que implementa [`ModelIo`].
//! O crate traz um backend JSON ([`JsonIo`]); outros formatos só precisam
//! implementar o trait.
//!
//! Os campos do registro dependem do modo:
//! - **Treinável**: `labels`, `weights`, `is_frozen = false`, `min_update`,
//!   `update_index`, `true_labels`.
//! - **Congelado**: `labels`, `weights`, `is_frozen = true`, `label_indices`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PerceptronError, PerceptronResult};
use crate::weights::FeatureWeights;

/// Todos os parâmetros de um [`crate::Perceptron`], em forma serializável.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub labels: Vec<String>,
    /// `BTreeMap` para que a saída serializada seja determinística.
    pub weights: BTreeMap<String, FeatureWeights>,
    pub is_frozen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_update: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_labels: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_indices: Option<Vec<usize>>,
}

/// Backend de serialização injetado em `save`/`load`.
pub trait ModelIo {
    type Error;

    fn save(&self, path: &Path, record: &ModelRecord) -> Result<(), Self::Error>;

    fn load(&self, path: &Path) -> Result<ModelRecord, Self::Error>;
}

/// Backend JSON baseado em `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonIo {
    /// Indenta a saída (mais legível, arquivos maiores).
    pub pretty: bool,
}

impl JsonIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl ModelIo for JsonIo {
    type Error = PerceptronError;

    fn save(&self, path: &Path, record: &ModelRecord) -> PerceptronResult<()> {
        debug!(path = %path.display(), features = record.weights.len(), "saving model");
        let mut writer = BufWriter::new(File::create(path)?);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, record)?;
        } else {
            serde_json::to_writer(&mut writer, record)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn load(&self, path: &Path) -> PerceptronResult<ModelRecord> {
        debug!(path = %path.display(), "loading model");
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
