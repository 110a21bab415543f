use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlsError {
    #[error("invalid calibration data")]
    InvalidData,
    #[error("no usable calibration mapping")]
    NoMapping,
    #[error("backend failure: {0}")]
    Backend(anyhow::Error),
    #[error("too many registered sensors")]
    OutOfCapacity,
    #[error("unknown sensor handle")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("current illuminance invalid")]
    InvalidReading,
}
