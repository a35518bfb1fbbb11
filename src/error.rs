use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("failed reading response body from {url}: {source}")]
    NetworkIo {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("response from {url} is not a decodable image: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("sample index {index} out of range for manifest of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("io error reading manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error in manifest {path}: {source}")]
    ManifestJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("mask {url} has diverging color channels")]
    MaskChannelMismatch { url: String },
    #[error("mask {position} of sample {index} has no foreground pixels")]
    EmptyMask { index: usize, position: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("tensor operation failed: {0}")]
    Tensor(#[from] tch::TchError),
}
