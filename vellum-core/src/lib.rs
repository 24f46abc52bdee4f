//! Vellum Core - Strongly-typed identifiers and stream positions.
//!
//! This crate provides the vocabulary types shared by the Vellum sink:
//! partition identifiers, stream offsets, and event timestamps. It performs
//! no I/O and has no dependencies.
//!
//! # Design Principles
//!
//! - **Strongly-typed values**: a `PartitionId` cannot be confused with a
//!   raw counter, an `Offset` cannot be confused with a byte position
//! - **Opaque positions**: offsets carry ordering and equality, nothing else
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod types;

pub use types::{Offset, PartitionId, SourceOffset, Timestamp};
