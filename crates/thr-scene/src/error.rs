use thiserror::Error;
use thr_types::ThrError;

/// Errors raised by the scene engine.
///
/// None of these is fatal to the engine: the offending event, pair or sink
/// call is skipped and the next tick re-evaluates from current truth.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("no arm is capable of {action_type}{parameters:?}, event ignored")]
    NoArmAffinity {
        action_type: String,
        parameters: Vec<String>,
    },

    #[error("action event #{sequence} arrived after #{last}; events must be applied in publish order")]
    OutOfOrder { sequence: u64, last: u64 },

    #[error("invalid scene configuration: {0}")]
    InvalidConfig(String),

    #[error("visualization sink {sink} failed: {reason}")]
    Sink { sink: String, reason: String },
}

impl From<SceneError> for ThrError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::InvalidConfig(msg) => ThrError::Config(msg),
            other => ThrError::Scene(other.to_string()),
        }
    }
}
