//! # perceptron-core — Averaged Perceptron com Lazy Averaging
//!
//! Este crate implementa um classificador **perceptron multiclasse com média dos pesos**,
//! pensado para servir de função de score treinável em predição estruturada baseada em
//! transições (ex: parsers), onde o espaço de features e o de labels crescem durante o treino.
//!
//! ## Arquitetura
//!
//! 1.  **Features** ([`features`]): o sistema externo entrega um mapa esparso `nome -> valor`.
//! 2.  **Pesos por Feature** ([`weights`]): vetor denso por label + contabilidade da média preguiçosa.
//! 3.  **Perceptron** ([`perceptron`]): relógio global de atualizações, labels crescentes,
//!     score, atualização e finalização (média + poda).
//! 4.  **Persistência** ([`persistence`]): registro serializável e backend injetável.
//! 5.  **Treino** ([`trainer`]): laço online sobre exemplos anotados.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use perceptron_core::{FeatureVector, Perceptron};
//!
//! // 1. Modelo treinável com dois labels e min_update = 1
//! let mut model = Perceptron::new(vec!["SHIFT".into(), "REDUCE".into()], 1);
//!
//! // 2. Features extraídas de um estado
//! let features: FeatureVector = [("s0=casa", 1.0), ("bias", 1.0)].into_iter().collect();
//!
//! // 3. Prediz, compara com o label correto e atualiza
//! let predicted = model.predict(&features).unwrap();
//! model.update(&features, predicted, 1, 1.0).unwrap();
//!
//! // 4. Congela: média dos pesos e poda de labels/features
//! let frozen = model.finalize(true).unwrap();
//! assert_eq!(frozen.predict(&features), Some(1));
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod perceptron;
pub mod persistence;
pub mod trainer;
pub mod weights;

pub use config::PerceptronConfig;
pub use error::{PerceptronError, PerceptronResult};
pub use features::FeatureVector;
pub use perceptron::Perceptron;
pub use persistence::{JsonIo, ModelIo, ModelRecord};
pub use trainer::{train, EpochReport, Example};
pub use weights::FeatureWeights;
