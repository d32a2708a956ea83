use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapfError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type MapfResult<T> = Result<T, MapfError>;
