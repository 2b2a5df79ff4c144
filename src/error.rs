use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("module load error: {0}")]
    ModuleLoadError(#[from] crate::plugin::ModuleLoadError),
    #[error("generator does not support this output: {0}")]
    UnsupportedOutput(String),
    #[error("invalid test id: {0}")]
    InvalidTestId(i32),
    #[error("self-test failed for generator {0}")]
    SelfTestFailed(String),
    #[error("generator {0} does not implement a self-test")]
    PrngMissingSelfTest(String),
    #[error("argument outside of valid range: {0}")]
    RangeError(String),
    #[error("test worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("broken argument dependency: {0}")]
    DependencyError(String),
    #[error("error writing to file: {0}")]
    IOError(#[from] io::Error),
    #[error("error (de)serializing JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    SeedError(#[from] crate::entropy::SeedFromHexError),
}
