use thiserror::Error;

#[derive(Error, Debug)]
pub enum RifthashError {
    #[error("invalid parameters: {0}")]
    Invalid(String),

    #[error("failed to allocate {0} bytes for the cache")]
    NoMemory(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DAG generation aborted by callback")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, RifthashError>;
