//! # Pesos por Feature com Média Preguiçosa
//!
//! Cada feature observada guarda um vetor denso de pesos indexado por label.
//!
//! ## Lazy Averaging
//!
//! O Averaged Perceptron usa como modelo final a média dos pesos em todos os passos
//! de treino. Somar o vetor inteiro a cada passo custaria $O(F \cdot L \cdot T)$.
//! Em vez disso, cada célula `(feature, label)` guarda a tripla
//! `(peso, total acumulado, último passo sincronizado)` e só dobra a contribuição
//! pendente quando é tocada:
//!
//! $$ total_i \mathrel{+}= w_i \cdot (t - t^{last}_i) $$
//!
//! Como $w_i$ é constante entre duas sincronizações, o resultado é exatamente o
//! mesmo da soma passo a passo.

use serde::{Deserialize, Serialize};

use crate::error::{PerceptronError, PerceptronResult};

/// Os pesos de uma feature, para todos os labels.
///
/// Existem dois modos de construção:
/// - [`FeatureWeights::new`]: treinável, com a contabilidade da média (`history`).
/// - [`FeatureWeights::from_weights`]: congelado, só o vetor final de pesos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    /// Peso atual (sem média) $w_i$ para cada label $i$.
    weights: Vec<f64>,
    /// Ausente em pesos congelados.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    history: Option<History>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct History {
    /// Integral temporal de `weights[i]` até `last_update[i]`.
    totals: Vec<f64>,
    last_update: Vec<u64>,
    /// Em quantos passos de atualização a feature participou.
    update_count: u64,
    /// Último passo contado em `update_count`.
    #[serde(default)]
    last_step: u64,
}

impl History {
    fn sync(&mut self, weights: &[f64], label: usize, step: u64) {
        let elapsed = step.saturating_sub(self.last_update[label]);
        self.totals[label] += weights[label] * elapsed as f64;
        self.last_update[label] = step;
    }
}

impl FeatureWeights {
    /// Pesos zerados, treináveis, para `num_labels` labels.
    pub fn new(num_labels: usize) -> Self {
        Self {
            weights: vec![0.0; num_labels],
            history: Some(History {
                totals: vec![0.0; num_labels],
                last_update: vec![0; num_labels],
                update_count: 0,
                last_step: 0,
            }),
        }
    }

    /// Pesos congelados, sem contabilidade de média.
    pub fn from_weights(weights: Vec<f64>) -> Self {
        Self {
            weights,
            history: None,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.history.is_none()
    }

    /// Número de passos de atualização em que a feature participou (0 quando congelada).
    pub fn update_count(&self) -> u64 {
        self.history.as_ref().map_or(0, |h| h.update_count)
    }

    /// Soma `value` ao peso de `label` no passo `step`.
    ///
    /// Antes de alterar o peso, o total de `label` é sincronizado até `step`
    /// com o valor antigo. Várias chamadas no mesmo passo (o label correto e o
    /// predito) contam como uma única participação.
    pub fn update(&mut self, label: usize, value: f64, step: u64) -> PerceptronResult<()> {
        let num_labels = self.weights.len();
        let history = self
            .history
            .as_mut()
            .ok_or(PerceptronError::Frozen { operation: "update" })?;
        if label >= num_labels {
            return Err(PerceptronError::LabelOutOfRange { label, num_labels });
        }

        if history.update_count == 0 || step != history.last_step {
            history.update_count += 1;
            history.last_step = step;
        }
        history.sync(&self.weights, label, step);
        self.weights[label] += value;
        Ok(())
    }

    /// Produz os pesos congelados para os labels mantidos.
    ///
    /// Sincroniza os totais de `labels` até `step` e devolve, na ordem de `labels`,
    /// `total / step` (média temporal) quando `average` é verdadeiro, ou o peso
    /// atual caso contrário. O remapeamento dos índices fica com quem chama.
    pub fn finalize(&mut self, step: u64, labels: &[usize], average: bool) -> PerceptronResult<Self> {
        let num_labels = self.weights.len();
        let history = self
            .history
            .as_mut()
            .ok_or(PerceptronError::Frozen { operation: "finalize" })?;
        if let Some(&label) = labels.iter().find(|&&l| l >= num_labels) {
            return Err(PerceptronError::LabelOutOfRange { label, num_labels });
        }

        for &label in labels {
            history.sync(&self.weights, label, step);
        }

        let weights = labels
            .iter()
            .map(|&label| match (average, step) {
                (true, 0) => 0.0,
                (true, _) => history.totals[label] / step as f64,
                (false, _) => self.weights[label],
            })
            .collect();
        Ok(Self::from_weights(weights))
    }

    /// Cresce (nunca encolhe) os vetores para `num_labels`, preenchendo com zeros.
    pub fn resize(&mut self, num_labels: usize) {
        if num_labels <= self.weights.len() {
            return;
        }
        self.weights.resize(num_labels, 0.0);
        if let Some(history) = self.history.as_mut() {
            history.totals.resize(num_labels, 0.0);
            history.last_update.resize(num_labels, 0);
        }
    }

    /// Confere a consistência interna de pesos vindos de um registro persistido.
    pub(crate) fn validate(&self) -> PerceptronResult<()> {
        if let Some(history) = &self.history {
            let n = self.weights.len();
            if history.totals.len() != n || history.last_update.len() != n {
                return Err(PerceptronError::invalid_record(format!(
                    "bookkeeping vectors of length {}/{} for {} weights",
                    history.totals.len(),
                    history.last_update.len(),
                    n
                )));
            }
        }
        Ok(())
    }
}
