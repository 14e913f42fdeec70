//! PubMed literature search (NCBI E-utilities)

mod client;

pub use client::{PubMedClient, PubMedError};
