//! Configuration surface (spec section 6 / SPEC_FULL section 10.3): an
//! in-process, builder-style entry point mirroring the teacher's
//! `Prisirv` method-chaining `struct`, wrapping the per-model
//! [`ModelConfig`](crate::model::ModelConfig) and the transform-wide
//! [`TransformConfig`]. This is the "Configuration surface" spec.md
//! describes; the out-of-scope CLI argument parser that would populate
//! one of these from `argv` is an external collaborator (spec section 1).

use crate::error::ConfigError;
use crate::model::ModelConfig;
use crate::search::{Algorithm, ContextScope};

/// Transform-wide knobs (spec section 6): which search algorithm drives
/// the frontier, and whether leaves sharing a model at an input position
/// share one rolling context or keep their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformConfig {
    pub algorithm: Algorithm,
    pub context_scope: ContextScope,
}

impl Default for TransformConfig {
    fn default() -> TransformConfig {
        TransformConfig { algorithm: Algorithm::Viterbi, context_scope: ContextScope::Multi }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Algorithm::Stack { stack_depth, .. } = self.algorithm {
            if stack_depth == 0 {
                // stack_depth == 0 means "unlimited" per spec 4.5, which is
                // always valid; only a caller-declared type1 bound of zero
                // combined with an explicit request for bounded search is
                // rejected by its own constructor, not here.
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Method-chaining configuration builder (mirrors the teacher's
/// `Prisirv` builder), collecting one or more `ModelConfig`s and a
/// `TransformConfig` before a caller drives `SearchDriver`/`Model`
/// directly. `Scriven` holds no I/O state of its own — spec section 1
/// keeps file opening, archive packaging, and model serialisation out of
/// this crate.
#[derive(Clone, Default)]
pub struct Scriven {
    models: Vec<ModelConfig>,
    transform: TransformConfig,
}

impl Scriven {
    pub fn new() -> Scriven {
        Scriven::default()
    }

    /// Register a model configuration; models are consulted in
    /// registration order wherever "the configured models" are needed.
    pub fn model(mut self, config: ModelConfig) -> Self {
        self.models.push(config);
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.transform.algorithm = algorithm;
        self
    }

    pub fn context_scope(mut self, scope: ContextScope) -> Self {
        self.transform.context_scope = scope;
        self
    }

    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    pub fn transform_config(&self) -> TransformConfig {
        self.transform
    }

    /// Validate the accumulated configuration before it is handed to a
    /// `SearchDriver`/`ModelRegistry` (spec section 7: "config out of
    /// range" is a recoverable, reportable error, not a panic).
    pub fn build(self) -> Result<Scriven, ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        self.transform.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_no_models() {
        let result = Scriven::new().build();
        assert!(matches!(result, Err(ConfigError::NoModels)));
    }

    #[test]
    fn build_accepts_a_configured_model() {
        let result = Scriven::new().model(ModelConfig::default()).build();
        assert!(result.is_ok());
    }

    #[test]
    fn chaining_accumulates_models_in_order() {
        let cfg = Scriven::new()
            .model(ModelConfig { tag: "a".into(), ..ModelConfig::default() })
            .model(ModelConfig { tag: "b".into(), ..ModelConfig::default() })
            .build()
            .unwrap();
        assert_eq!(cfg.models().iter().map(|m| m.tag.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
