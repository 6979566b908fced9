//! # Configuração do Treino
//!
//! Parâmetros que controlam como o perceptron aprende e como o modelo final é
//! produzido. Todos os campos têm valores padrão, então um JSON parcial
//! (ex: `{"min_update": 3}`) é suficiente.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PerceptronError, PerceptronResult};

/// Configuração do perceptron e do laço de treino.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptronConfig {
    /// Número mínimo de atualizações para que uma feature seja usada no score
    /// (modelo treinável) e mantida na finalização.
    pub min_update: u64,
    /// Escala aplicada ao vetor de features em cada atualização.
    pub learning_rate: f64,
    /// Número de épocas (passadas completas pelos exemplos).
    pub iterations: usize,
    /// Se `true`, o modelo final usa a média temporal dos pesos.
    pub average: bool,
}

impl Default for PerceptronConfig {
    fn default() -> Self {
        Self {
            min_update: 1,
            learning_rate: 1.0,
            iterations: 1,
            average: true,
        }
    }
}

impl PerceptronConfig {
    /// Lê a configuração de uma string JSON e valida os valores.
    pub fn from_json(json: &str) -> PerceptronResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Lê a configuração de um arquivo JSON.
    pub fn load(path: impl AsRef<Path>) -> PerceptronResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> PerceptronResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(PerceptronError::config(format!(
                "learning_rate must be finite and positive, got {}",
                self.learning_rate
            )));
        }
        if self.iterations == 0 {
            return Err(PerceptronError::config("iterations must be at least 1"));
        }
        Ok(())
    }
}
