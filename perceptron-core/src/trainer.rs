//! # Laço de Treino Online
//!
//! Para cada exemplo:
//! 1. Faz uma predição com os pesos atuais (sem média).
//! 2. Chama `update` com o label predito e o correto.
//!
//! Diferente de um perceptron puramente mistake-driven, `update` é chamado também
//! nos acertos: eles não mudam os pesos, mas contam como ocorrências das features
//! para o `min_update` e avançam o relógio da média.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PerceptronConfig;
use crate::error::PerceptronResult;
use crate::features::FeatureVector;
use crate::perceptron::Perceptron;

/// Um exemplo anotado: features extraídas e a posição do label correto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub features: FeatureVector,
    pub label: usize,
}

impl Example {
    pub fn new(features: FeatureVector, label: usize) -> Self {
        Self { features, label }
    }
}

/// Resultado de uma época de treino.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub correct: usize,
    pub total: usize,
}

impl EpochReport {
    /// Acurácia de treino da época (predições feitas antes de cada atualização).
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

/// Treina `model` por `config.iterations` épocas sobre `examples`.
///
/// O modelo continua treinável ao final; chame [`Perceptron::finalize`] com
/// `config.average` para obter o modelo congelado.
pub fn train(
    model: &mut Perceptron,
    examples: &[Example],
    config: &PerceptronConfig,
) -> PerceptronResult<Vec<EpochReport>> {
    config.validate()?;
    let mut reports = Vec::with_capacity(config.iterations);

    for epoch in 0..config.iterations {
        let mut correct = 0;
        for example in examples {
            let predicted = model.predict(&example.features).unwrap_or(example.label);
            if predicted == example.label {
                correct += 1;
            }
            model.update(&example.features, predicted, example.label, config.learning_rate)?;
        }

        let report = EpochReport {
            epoch,
            correct,
            total: examples.len(),
        };
        info!("Epoch {}: Accuracy {:.2}%", epoch, report.accuracy() * 100.0);
        reports.push(report);
    }
    Ok(reports)
}
