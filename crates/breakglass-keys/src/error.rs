use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid master secret: {0}")]
    InvalidSecret(String),
}
