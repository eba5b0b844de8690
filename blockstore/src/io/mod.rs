mod block;

pub use block::{BlockNumber, BlockStorage};
