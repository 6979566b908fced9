//! # Averaged Perceptron Multiclasse
//!
//! Classificador online e **mistake-driven** usado como função de score em
//! predição estruturada baseada em transições: o sistema externo extrai features,
//! pede os scores de cada label, escolhe uma ação e depois informa a ação correta.
//!
//! ## Características
//! - **Lazy Averaging**: ver [`crate::weights`].
//! - **Espaço de labels crescente**: labels podem ser adicionados no meio do treino
//!   sem invalidar os vetores já armazenados.
//! - **min_update**: features vistas poucas vezes não influenciam o score e são
//!   descartadas na finalização.
//! - **Congelamento**: [`Perceptron::finalize`] produz um modelo imutável, podado e
//!   com pesos médios, que só serve para pontuar.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::PerceptronConfig;
use crate::error::{PerceptronError, PerceptronResult};
use crate::features::FeatureVector;
use crate::persistence::{ModelIo, ModelRecord};
use crate::weights::FeatureWeights;

/// Perceptron multiclasse com média dos pesos e limiar mínimo de atualizações.
///
/// # Ciclo de vida
/// 1. Criado vazio e treinável ([`Perceptron::new`]).
/// 2. Treinado com chamadas alternadas a [`Perceptron::score`] e [`Perceptron::update`].
/// 3. Congelado com [`Perceptron::finalize`], que devolve um **novo** modelo.
///
/// Os índices de label são posições densas `0..num_labels` na sequência de labels.
/// Num modelo congelado os scores continuam indexados pelas posições **originais**,
/// mesmo depois da poda dos labels que nunca apareceram como corretos.
#[derive(Debug, Clone)]
pub struct Perceptron {
    labels: Vec<String>,
    /// Número de labels no momento da criação (para o relatório de finalização).
    init_num_labels: usize,
    state: ModelState,
}

#[derive(Debug, Clone)]
enum ModelState {
    Trainable(Training),
    Frozen(Frozen),
}

#[derive(Debug, Clone)]
struct Training {
    weights: HashMap<String, FeatureWeights>,
    min_update: u64,
    /// Contador de chamadas a `update` (o "relógio" da média).
    update_index: u64,
    /// O label já foi o correto em alguma atualização?
    true_labels: Vec<bool>,
}

impl Training {
    /// Acompanha o crescimento da sequência de labels.
    ///
    /// Precisa rodar antes de qualquer indexação nas posições novas.
    fn grow(&mut self, num_labels: usize) {
        if num_labels <= self.true_labels.len() {
            return;
        }
        debug!(
            from = self.true_labels.len(),
            to = num_labels,
            features = self.weights.len(),
            "growing label space"
        );
        self.true_labels.resize(num_labels, false);
        for weights in self.weights.values_mut() {
            weights.resize(num_labels);
        }
    }
}

#[derive(Debug, Clone)]
struct Frozen {
    weights: HashMap<String, FeatureWeights>,
    /// Posição original de cada label mantido.
    label_indices: Option<Vec<usize>>,
}

impl Perceptron {
    /// Cria um perceptron treinável e vazio.
    pub fn new(labels: Vec<String>, min_update: u64) -> Self {
        let num_labels = labels.len();
        Self {
            labels,
            init_num_labels: num_labels,
            state: ModelState::Trainable(Training {
                weights: HashMap::new(),
                min_update,
                update_index: 0,
                true_labels: vec![false; num_labels],
            }),
        }
    }

    pub fn with_config(labels: Vec<String>, config: &PerceptronConfig) -> Self {
        Self::new(labels, config.min_update)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    /// Posição de `label` na sequência atual de labels.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Acrescenta um label ao fim da sequência e devolve sua posição.
    ///
    /// Todos os vetores de pesos existentes crescem imediatamente; os pesos dos
    /// labels antigos continuam nas mesmas posições.
    pub fn add_label(&mut self, label: impl Into<String>) -> PerceptronResult<usize> {
        let ModelState::Trainable(training) = &mut self.state else {
            return Err(PerceptronError::Frozen { operation: "add a label to" });
        };
        self.labels.push(label.into());
        training.grow(self.labels.len());
        Ok(self.labels.len() - 1)
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.state, ModelState::Frozen(_))
    }

    pub fn num_features(&self) -> usize {
        self.weights().len()
    }

    /// Número de chamadas a `update` até agora (`None` se congelado).
    pub fn update_index(&self) -> Option<u64> {
        match &self.state {
            ModelState::Trainable(training) => Some(training.update_index),
            ModelState::Frozen(_) => None,
        }
    }

    pub fn min_update(&self) -> Option<u64> {
        match &self.state {
            ModelState::Trainable(training) => Some(training.min_update),
            ModelState::Frozen(_) => None,
        }
    }

    pub fn feature_weights(&self, feature: &str) -> Option<&FeatureWeights> {
        self.weights().get(feature)
    }

    /// Posições originais dos labels de um modelo congelado.
    pub fn label_indices(&self) -> Option<&[usize]> {
        match &self.state {
            ModelState::Frozen(frozen) => frozen.label_indices.as_deref(),
            ModelState::Trainable(_) => None,
        }
    }

    fn weights(&self) -> &HashMap<String, FeatureWeights> {
        match &self.state {
            ModelState::Trainable(training) => &training.weights,
            ModelState::Frozen(frozen) => &frozen.weights,
        }
    }

    fn original_index(&self, index: usize) -> usize {
        match &self.state {
            ModelState::Frozen(Frozen { label_indices: Some(indices), .. }) => {
                indices.get(index).copied().unwrap_or(index)
            }
            _ => index,
        }
    }

    /// Score para cada posição interna de label.
    ///
    /// $$ score_l = \sum_f x_f \cdot w_{f,l} $$
    fn score_vector(&self, features: &FeatureVector) -> Vec<f64> {
        let (weights, min_update) = match &self.state {
            ModelState::Trainable(training) => (&training.weights, training.min_update),
            ModelState::Frozen(frozen) => (&frozen.weights, 0),
        };

        let mut scores = vec![0.0; self.labels.len()];
        for (name, value) in features.active() {
            let Some(feature) = weights.get(name) else {
                continue;
            };
            // Features raras ainda não têm suporte estatístico suficiente
            if feature.update_count() < min_update {
                continue;
            }
            for (score, weight) in scores.iter_mut().zip(feature.weights()) {
                *score += value * weight;
            }
        }
        scores
    }

    /// Calcula o score de cada label.
    ///
    /// As chaves são as posições originais dos labels. Features ausentes do modelo
    /// (ou, num modelo treinável, abaixo de `min_update`) contribuem com zero.
    pub fn score(&self, features: &FeatureVector) -> HashMap<usize, f64> {
        self.score_vector(features)
            .into_iter()
            .enumerate()
            .map(|(i, score)| (self.original_index(i), score))
            .collect()
    }

    /// Label de maior score (empates vão para a menor posição).
    pub fn predict(&self, features: &FeatureVector) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, score) in self.score_vector(features).into_iter().enumerate() {
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| self.original_index(i))
    }

    /// Atualiza os pesos de acordo com os labels predito e correto.
    ///
    /// $w_{f,correto} \leftarrow w_{f,correto} + \eta \cdot x_f$
    ///
    /// $w_{f,predito} \leftarrow w_{f,predito} - \eta \cdot x_f$
    ///
    /// Quando `predicted == true_label` os pesos não mudam, mas a contagem de
    /// atualizações das features sobe mesmo assim: acertos também contam como
    /// ocorrências para o `min_update`. As duas atualizações compartilham o mesmo
    /// passo de sincronização.
    pub fn update(
        &mut self,
        features: &FeatureVector,
        predicted: usize,
        true_label: usize,
        learning_rate: f64,
    ) -> PerceptronResult<()> {
        let num_labels = self.labels.len();
        let ModelState::Trainable(training) = &mut self.state else {
            return Err(PerceptronError::Frozen { operation: "update" });
        };
        for label in [predicted, true_label] {
            if label >= num_labels {
                return Err(PerceptronError::LabelOutOfRange { label, num_labels });
            }
        }

        training.update_index += 1;
        training.grow(num_labels);
        training.true_labels[true_label] = true;

        let step = training.update_index;
        for (name, value) in features.active() {
            let weights = training
                .weights
                .entry(name.to_string())
                .or_insert_with(|| FeatureWeights::new(num_labels));
            weights.update(true_label, learning_rate * value, step)?;
            weights.update(predicted, -learning_rate * value, step)?;
        }
        Ok(())
    }

    /// Congela o modelo: média dos pesos e poda de labels e features.
    ///
    /// - Labels que nunca foram o label correto em `update` são removidos.
    /// - Features com menos de `min_update` atualizações são removidas.
    /// - Com `average = false` os pesos atuais são usados sem média (útil para
    ///   comparação e depuração).
    ///
    /// O modelo treinável continua utilizável depois da chamada.
    pub fn finalize(&mut self, average: bool) -> PerceptronResult<Perceptron> {
        let started = Instant::now();
        let num_labels = self.labels.len();
        let ModelState::Trainable(training) = &mut self.state else {
            return Err(PerceptronError::Frozen { operation: "finalize" });
        };
        training.grow(num_labels);

        let label_indices: Vec<usize> = training
            .true_labels
            .iter()
            .enumerate()
            .filter_map(|(i, &occurred)| occurred.then_some(i))
            .collect();
        let labels: Vec<String> = label_indices.iter().map(|&i| self.labels[i].clone()).collect();

        let step = training.update_index;
        let min_update = training.min_update;
        let weights = training
            .weights
            .par_iter_mut()
            .filter(|(_, weights)| weights.update_count() >= min_update)
            .map(|(name, weights)| {
                weights
                    .finalize(step, &label_indices, average)
                    .map(|finalized| (name.clone(), finalized))
            })
            .collect::<PerceptronResult<HashMap<_, _>>>()?;

        if average {
            info!("Averaged weights over {} updates ({:.3}s)", step, started.elapsed().as_secs_f64());
        }
        let removed: Vec<&str> = self
            .labels
            .iter()
            .zip(&training.true_labels)
            .filter(|(_, &occurred)| !occurred)
            .map(|(label, _)| label.as_str())
            .collect();
        info!(
            "Labels: {} original, {} new, {} removed ({})",
            self.init_num_labels,
            num_labels.saturating_sub(self.init_num_labels),
            removed.len(),
            removed.join(", ")
        );
        info!(
            "Features: {} overall, {} occurred at least {} times",
            training.weights.len(),
            weights.len(),
            min_update
        );

        Ok(Perceptron {
            init_num_labels: labels.len(),
            labels,
            state: ModelState::Frozen(Frozen {
                weights,
                label_indices: Some(label_indices),
            }),
        })
    }

    /// Escreve os pesos como tabela de texto (uma linha por feature).
    ///
    /// Cabeçalho `feature<sep><label1><sep>...`; valores com 8 casas decimais.
    /// Serve para inspeção, não é recarregável.
    pub fn write_table<W: Write>(&self, mut out: W, sep: &str) -> std::io::Result<()> {
        let header: Vec<&str> = std::iter::once("feature")
            .chain(self.labels.iter().map(String::as_str))
            .collect();
        writeln!(out, "{}", header.join(sep))?;

        let mut features: Vec<_> = self.weights().iter().collect();
        features.sort_by(|a, b| a.0.cmp(b.0));
        for (name, weights) in features {
            let mut line = name.clone();
            for weight in weights.weights() {
                line.push_str(sep);
                line.push_str(&format!("{weight:.8}"));
            }
            writeln!(out, "{line}")?;
        }
        out.flush()
    }

    pub fn write(&self, path: impl AsRef<Path>, sep: &str) -> PerceptronResult<()> {
        let path = path.as_ref();
        info!("Writing model to '{}'...", path.display());
        let file = File::create(path)?;
        self.write_table(BufWriter::new(file), sep)?;
        Ok(())
    }

    /// Registro com todos os parâmetros do modelo, pronto para serializar.
    pub fn to_record(&self) -> ModelRecord {
        let weights = self
            .weights()
            .iter()
            .map(|(name, weights)| (name.clone(), weights.clone()))
            .collect();
        match &self.state {
            ModelState::Trainable(training) => ModelRecord {
                labels: self.labels.clone(),
                weights,
                is_frozen: false,
                min_update: Some(training.min_update),
                update_index: Some(training.update_index),
                true_labels: Some(training.true_labels.clone()),
                label_indices: None,
            },
            ModelState::Frozen(frozen) => ModelRecord {
                labels: self.labels.clone(),
                weights,
                is_frozen: true,
                min_update: None,
                update_index: None,
                true_labels: None,
                label_indices: frozen.label_indices.clone(),
            },
        }
    }

    /// Reconstrói um modelo a partir de um registro, validando seus campos.
    pub fn from_record(record: ModelRecord) -> PerceptronResult<Self> {
        let ModelRecord {
            labels,
            weights,
            is_frozen,
            min_update,
            update_index,
            true_labels,
            label_indices,
        } = record;
        let num_labels = labels.len();

        for (name, feature) in &weights {
            feature.validate()?;
            if feature.is_frozen() != is_frozen {
                return Err(PerceptronError::invalid_record(format!(
                    "feature '{name}' does not match is_frozen = {is_frozen}"
                )));
            }
            let too_long = feature.len() > num_labels;
            let too_short = is_frozen && feature.len() < num_labels;
            if too_long || too_short {
                return Err(PerceptronError::invalid_record(format!(
                    "feature '{name}' has {} weights for {num_labels} labels",
                    feature.len()
                )));
            }
        }
        let mut weights: HashMap<String, FeatureWeights> = weights.into_iter().collect();

        let state = if is_frozen {
            if let Some(indices) = &label_indices {
                if indices.len() != num_labels {
                    return Err(PerceptronError::invalid_record(format!(
                        "{} label indices for {num_labels} labels",
                        indices.len()
                    )));
                }
            }
            ModelState::Frozen(Frozen { weights, label_indices })
        } else {
            let missing = |field: &str| PerceptronError::invalid_record(format!("missing {field}"));
            let min_update = min_update.ok_or_else(|| missing("min_update"))?;
            let update_index = update_index.ok_or_else(|| missing("update_index"))?;
            let mut true_labels = true_labels.ok_or_else(|| missing("true_labels"))?;
            if true_labels.len() > num_labels {
                return Err(PerceptronError::invalid_record(format!(
                    "{} true label flags for {num_labels} labels",
                    true_labels.len()
                )));
            }
            true_labels.resize(num_labels, false);
            for feature in weights.values_mut() {
                feature.resize(num_labels);
            }
            ModelState::Trainable(Training {
                weights,
                min_update,
                update_index,
                true_labels,
            })
        };

        Ok(Self {
            init_num_labels: num_labels,
            labels,
            state,
        })
    }

    /// Salva todos os parâmetros com o backend de serialização `io`.
    ///
    /// Erros do backend são devolvidos sem alteração.
    pub fn save<I: ModelIo>(&self, path: impl AsRef<Path>, io: &I) -> Result<(), I::Error> {
        io.save(path.as_ref(), &self.to_record())
    }

    /// Carrega todos os parâmetros, substituindo o estado atual por inteiro.
    pub fn load<I>(&mut self, path: impl AsRef<Path>, io: &I) -> Result<(), I::Error>
    where
        I: ModelIo,
        I::Error: From<PerceptronError>,
    {
        let record = io.load(path.as_ref())?;
        *self = Self::from_record(record)?;
        Ok(())
    }
}

impl Default for Perceptron {
    fn default() -> Self {
        Self::new(Vec::new(), 1)
    }
}

impl fmt::Display for Perceptron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} labels total, ", self.labels.len())?;
        match &self.state {
            ModelState::Frozen(_) => write!(f, "frozen"),
            ModelState::Trainable(training) => {
                let occurred = training.true_labels.iter().filter(|&&t| t).count();
                write!(f, "{occurred} labels occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn fv(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|&(k, v)| (k, v)).collect()
    }

    #[test]
    fn test_update_and_score_scenario() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        let f1 = fv(&[("f1", 1.0)]);

        model.update(&f1, 0, 1, 1.0).unwrap();
        let weights = model.feature_weights("f1").unwrap();
        assert_eq!(weights.weights(), &[-1.0, 1.0]);
        assert_eq!(weights.update_count(), 1);

        // Acerto: pesos intactos, mas a contagem sobe
        model.update(&f1, 1, 1, 1.0).unwrap();
        let weights = model.feature_weights("f1").unwrap();
        assert_eq!(weights.weights(), &[-1.0, 1.0]);
        assert_eq!(weights.update_count(), 2);
        assert_eq!(model.update_index(), Some(2));

        let scores = model.score(&f1);
        assert_eq!(scores, HashMap::from([(0, -1.0), (1, 1.0)]));
        assert_eq!(model.predict(&f1), Some(1));
    }

    #[test]
    fn test_finalize_averages_weights() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        let f1 = fv(&[("f1", 1.0)]);

        // Peso de f1 para B: 0 nos passos 1-2, 1.0 nos passos 3-4
        model.update(&f1, 1, 1, 1.0).unwrap();
        model.update(&f1, 0, 1, 1.0).unwrap();
        model.update(&f1, 1, 1, 1.0).unwrap();
        model.update(&f1, 1, 1, 1.0).unwrap();

        let frozen = model.finalize(true).unwrap();
        assert!(frozen.is_frozen());
        // "A" nunca foi o label correto e some
        assert_eq!(frozen.labels(), &["B".to_string()]);
        assert_eq!(frozen.feature_weights("f1").unwrap().weights(), &[0.5]);
        assert_eq!(frozen.score(&f1), HashMap::from([(1, 0.5)]));
    }

    #[test]
    fn test_finalize_without_average() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        let f1 = fv(&[("f1", 2.0)]);
        model.update(&f1, 1, 0, 0.5).unwrap();
        model.update(&f1, 0, 1, 1.0).unwrap();

        let frozen = model.finalize(false).unwrap();
        assert_eq!(frozen.feature_weights("f1").unwrap().weights(), &[-1.0, 1.0]);
        assert_eq!(frozen.label_indices(), Some(&[0, 1][..]));
    }

    #[test]
    fn test_min_update_filters_score_and_finalize() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 2);
        let rare = fv(&[("rare", 1.0)]);
        let common = fv(&[("common", 1.0)]);

        model.update(&rare, 0, 1, 1.0).unwrap();
        model.update(&common, 0, 1, 1.0).unwrap();
        model.update(&common, 0, 1, 1.0).unwrap();

        // "rare" tem 1 atualização, abaixo do limiar
        assert_eq!(model.score(&rare), HashMap::from([(0, 0.0), (1, 0.0)]));
        assert_eq!(model.score(&common), HashMap::from([(0, -2.0), (1, 2.0)]));

        let frozen = model.finalize(true).unwrap();
        assert!(frozen.feature_weights("rare").is_none());
        assert!(frozen.feature_weights("common").is_some());
        assert_eq!(frozen.num_features(), 1);
    }

    #[test]
    fn test_label_pruning_keeps_original_positions() {
        let mut model = Perceptron::new(labels(&["A", "B", "C"]), 1);
        let f = fv(&[("f", 1.0)]);
        model.update(&f, 1, 2, 1.0).unwrap();
        model.update(&f, 2, 0, 1.0).unwrap();

        let frozen = model.finalize(true).unwrap();
        assert_eq!(frozen.labels(), &labels(&["A", "C"])[..]);

        let scores = frozen.score(&f);
        assert_eq!(scores.len(), 2);
        assert!(scores.contains_key(&0));
        assert!(scores.contains_key(&2));
        assert!(!scores.contains_key(&1));
    }

    #[test]
    fn test_label_growth_preserves_weights() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        let f = fv(&[("f", 1.0)]);
        model.update(&f, 0, 1, 1.0).unwrap();

        let c = model.add_label("C").unwrap();
        assert_eq!(c, 2);
        assert_eq!(model.feature_weights("f").unwrap().weights(), &[-1.0, 1.0, 0.0]);
        assert_eq!(model.score(&f), HashMap::from([(0, -1.0), (1, 1.0), (2, 0.0)]));

        model.update(&f, 1, c, 1.0).unwrap();
        assert_eq!(model.feature_weights("f").unwrap().weights(), &[-1.0, 0.0, 1.0]);
        assert_eq!(model.to_string(), "3 labels total, 2 labels occurred");
    }

    #[test]
    fn test_zero_valued_features_ignored() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        model.update(&fv(&[("zero", 0.0), ("one", 1.0)]), 0, 1, 1.0).unwrap();

        assert!(model.feature_weights("zero").is_none());
        assert_eq!(model.num_features(), 1);
    }

    #[test]
    fn test_rejected_update_leaves_state() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        let err = model.update(&fv(&[("f", 1.0)]), 0, 5, 1.0).unwrap_err();

        assert!(matches!(err, PerceptronError::LabelOutOfRange { label: 5, num_labels: 2 }));
        assert_eq!(model.update_index(), Some(0));
        assert_eq!(model.num_features(), 0);
    }

    #[test]
    fn test_frozen_model_rejects_training() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        model.update(&fv(&[("f", 1.0)]), 0, 1, 1.0).unwrap();
        let mut frozen = model.finalize(true).unwrap();

        assert!(matches!(
            frozen.update(&fv(&[("f", 1.0)]), 0, 0, 1.0),
            Err(PerceptronError::Frozen { operation: "update" })
        ));
        assert!(matches!(frozen.finalize(true), Err(PerceptronError::Frozen { .. })));
        assert!(frozen.add_label("C").is_err());
        assert_eq!(frozen.to_string(), "1 labels total, frozen");
        assert_eq!(frozen.update_index(), None);
    }

    #[test]
    fn test_finalize_without_updates() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        let frozen = model.finalize(true).unwrap();

        assert_eq!(frozen.num_labels(), 0);
        assert!(frozen.score(&fv(&[("f", 1.0)])).is_empty());
        assert_eq!(frozen.predict(&fv(&[("f", 1.0)])), None);
    }

    #[test]
    fn test_predict_tie_goes_to_lowest() {
        let model = Perceptron::new(labels(&["A", "B", "C"]), 1);
        assert_eq!(model.predict(&fv(&[("unknown", 1.0)])), Some(0));
    }

    #[test]
    fn test_write_table() {
        let mut model = Perceptron::new(labels(&["A", "B"]), 1);
        model.update(&fv(&[("zeta", 1.0), ("alpha", 0.5)]), 0, 1, 1.0).unwrap();

        let mut out = Vec::new();
        model.write_table(&mut out, "\t").unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "feature\tA\tB\n\
             alpha\t-0.50000000\t0.50000000\n\
             zeta\t-1.00000000\t1.00000000\n"
        );
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.tsv");
        let model = Perceptron::new(labels(&["A"]), 1);

        model.write(&path, ",").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "feature,A\n");
    }
}
