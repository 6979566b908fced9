//! # Erros do Perceptron
//!
//! A taxonomia é pequena e baseada em pré-condições: quase todo erro aqui indica
//! uso incorreto da API (treinar um modelo congelado, índice de label inválido)
//! ou um registro persistido inconsistente.

use thiserror::Error;

/// Erro principal das operações do perceptron.
#[derive(Error, Debug)]
pub enum PerceptronError {
    /// Operação de treino chamada sobre um modelo congelado (finalizado).
    #[error("Cannot {operation} a frozen model")]
    Frozen { operation: &'static str },

    /// Índice de label fora da sequência atual de labels.
    #[error("Label index {label} out of range for {num_labels} labels")]
    LabelOutOfRange { label: usize, num_labels: usize },

    /// Registro carregado com campos inconsistentes.
    #[error("Invalid model record: {0}")]
    InvalidRecord(String),

    /// Valor de configuração inválido.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resultado das operações do perceptron.
pub type PerceptronResult<T> = Result<T, PerceptronError>;

impl PerceptronError {
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
