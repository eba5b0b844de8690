use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("block {id} out of range for device of {count} blocks")]
    OutOfRange { id: usize, count: usize },
    #[error("block {0} is already allocated")]
    AlreadyAllocated(usize),
    #[error("buffer of {len} bytes is smaller than the required {need} bytes")]
    BufferTooSmall { len: usize, need: usize },
    #[error("invalid device geometry: {0}")]
    InvalidGeometry(String),
    #[error("image is {actual} bytes, expected exactly {expected}")]
    ImageSize { expected: u64, actual: u64 },
    #[error("corrupt image: {0}")]
    Corrupt(String),
    #[error("device image io failed")]
    Io(#[from] std::io::Error),
}
