//! An in-memory block device whose allocation bitmap is stored in its own blocks.
//!
//! ```
//! use blockstore::{BlockStore, DefaultGeometry};
//!
//! let mut dev = BlockStore::<DefaultGeometry>::create().unwrap();
//! let id = dev.allocate().unwrap();
//!
//! let mut block = vec![0; 512];
//! block[..5].copy_from_slice(b"hello");
//! dev.write(id, &block).unwrap();
//! ```
mod alloc;
pub mod error;
mod geometry;
mod image;
pub mod io;
mod store;

pub use crate::alloc::{byte_len, Bitmap};
pub use crate::error::{Result, StoreError};
pub use crate::geometry::{DefaultGeometry, Geometry};
pub use crate::io::{BlockNumber, BlockStorage};
pub use crate::store::BlockStore;
