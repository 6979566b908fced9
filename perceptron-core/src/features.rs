//! # Vetores de Features Esparsos
//!
//! O sistema de transições externo extrai, para cada decisão, um conjunto pequeno
//! de features ativas (ex: `"s0_word=casa"`, `"b0_tag=NOUN"`). O perceptron só
//! enxerga esse mapa `nome -> valor`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Mapa esparso de features extraídas de uma instância.
///
/// Usamos `HashMap<String, f64>` porque o espaço de features é aberto e cresce
/// durante o treino, mas cada instância ativa apenas um punhado delas.
///
/// Valores zero contam como **ausentes**: nunca tocam os pesos nem criam entradas
/// novas no modelo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// As features extraídas. Ex: `{"bias": 1.0, "s0_word=casa": 1.0}`.
    pub features: HashMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self {
            features: HashMap::new(),
        }
    }

    /// Adiciona uma feature com valor 1.0 (binária) ou customizado.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.features.insert(key.into(), value);
    }

    /// Itera apenas sobre as features com valor diferente de zero.
    pub fn active(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.features
            .iter()
            .filter(|(_, &value)| value != 0.0)
            .map(|(name, &value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<HashMap<String, f64>> for FeatureVector {
    fn from(features: HashMap<String, f64>) -> Self {
        Self { features }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
