// lib.rs - 库函数

//! Command-line helpers for a sequencing-data workflow.
//!
//! - [`lanes`]: merge per-lane FASTQ files
//! - [`efetch`]: download nucleotide sequences through `efetch`
//! - [`symbols`]: convert Ensembl gene identifiers of an expression matrix
//! - [`simulate`]: simulate paired-end reads over a region
//! - [`pairs`]: keep complete read pairs of a SAM stream
//!
//! The library never configures logging; it reports through the `log`
//! facade and the binary decides where that goes.

pub mod efetch;
pub mod error;
pub mod io;
pub mod lanes;
pub mod pairs;
pub mod simulate;
pub mod symbols;

pub use error::{Error, Result};
