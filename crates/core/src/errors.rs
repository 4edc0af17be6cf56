use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown conversation stage `{0}`")]
    UnknownStage(String),
}
