#![forbid(unsafe_code)]

//! Fabric identity and operational credentials.
//!
//! A fabric is a set of nodes sharing trust anchors. This crate holds the
//! fabric table consulted by the session layer and the example operational
//! credentials issuer that mints Root → Intermediate → Node Operational
//! certificate chains from a CSR, persisting its key material through the
//! storage contract.

pub mod fabric;
pub mod issuer;
pub mod tlv;

pub use fabric::{Fabric, FabricTable};
pub use issuer::{NocChain, OperationalCredentialsIssuer};
pub use tlv::{TlvElement, TlvReader, TlvTag, TlvValue};

pub use weave_core::{Error, Result};
