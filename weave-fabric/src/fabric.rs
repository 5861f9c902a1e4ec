//! Fabric records and the local fabric table.
//!
//! Commissioning mutates the table; the session layer reads it while
//! addressing outbound messages and authenticating inbound ones. Indices
//! start at 1 so that index 0 stays the "unfabricked" marker used by PASE
//! sessions.

use tracing::info;
use weave_core::{Error, FabricId, FabricIndex, NodeId, Result};

/// One commissioned fabric: identity plus the operational credentials this
/// node received for it.
#[derive(Debug, Clone)]
pub struct Fabric {
    pub index: FabricIndex,
    pub fabric_id: FabricId,
    pub node_id: NodeId,
    pub label: String,
    /// Uncompressed SEC1 public key of the trusted root.
    pub root_public_key: Vec<u8>,
    /// Trusted root certificate, DER.
    pub root_cert: Vec<u8>,
    /// Intermediate certificate, DER, when the chain has one.
    pub icac: Option<Vec<u8>>,
    /// Node operational certificate, DER.
    pub noc: Vec<u8>,
}

/// Table of fabrics this node belongs to.
#[derive(Debug, Default)]
pub struct FabricTable {
    fabrics: Vec<Fabric>,
    next_index: u8,
}

impl FabricTable {
    pub fn new() -> Self {
        Self {
            fabrics: Vec::new(),
            next_index: 1,
        }
    }

    /// Add a fully-specified fabric; returns the index assigned to it.
    pub fn add(
        &mut self,
        fabric_id: FabricId,
        node_id: NodeId,
        label: impl Into<String>,
        root_public_key: Vec<u8>,
        root_cert: Vec<u8>,
        icac: Option<Vec<u8>>,
        noc: Vec<u8>,
    ) -> Result<FabricIndex> {
        if self.next_index == u8::MAX {
            return Err(Error::NoSpace("fabric"));
        }
        let index = FabricIndex(self.next_index);
        self.next_index += 1;
        let label = label.into();
        info!(%index, %fabric_id, %node_id, label = %label, "fabric added");
        self.fabrics.push(Fabric {
            index,
            fabric_id,
            node_id,
            label,
            root_public_key,
            root_cert,
            icac,
            noc,
        });
        Ok(index)
    }

    /// Test-only fabric with identity fields but no credentials.
    pub fn add_for_test(&mut self, fabric_id: FabricId, node_id: NodeId) -> Result<FabricIndex> {
        self.add(
            fabric_id,
            node_id,
            "test",
            Vec::new(),
            Vec::new(),
            None,
            Vec::new(),
        )
    }

    pub fn find(&self, index: FabricIndex) -> Option<&Fabric> {
        self.fabrics.iter().find(|f| f.index == index)
    }

    pub fn remove(&mut self, index: FabricIndex) -> Option<Fabric> {
        let pos = self.fabrics.iter().position(|f| f.index == index)?;
        let fabric = self.fabrics.remove(pos);
        info!(%index, "fabric removed");
        Some(fabric)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fabric> {
        self.fabrics.iter()
    }

    pub fn len(&self) -> usize {
        self.fabrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fabrics.is_empty()
    }
}
