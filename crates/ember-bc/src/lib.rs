//! Bytecode backend for the Ember compiler.
//!
//! A [`Driver`] runs the translation passes of one [`Target`] over an
//! [`ember_ir::Program`]. The only target today is [`ZdacsTarget`], which
//! produces a chunked ZDACS object.

pub mod alloc;
pub mod container;
pub mod driver;
pub mod error;
pub mod zdacs;

pub use alloc::SlotAllocator;
pub use container::{read_chunks, Chunk, ObjectWriter, PutBytes};
pub use driver::{Driver, Pass, Target};
pub use error::{BcError, BcResult};
pub use zdacs::{ZdacsConfig, ZdacsTarget};
