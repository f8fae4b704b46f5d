//! File-level wrapper used by the `bshuf` binaries: a `.bshuf` container that
//! stores a bitshuffle stream together with its item size, codec id and a
//! checksum of the raw data.

pub mod container;

pub use container::{ContainerError, ContainerHeader, Reader, Writer};
