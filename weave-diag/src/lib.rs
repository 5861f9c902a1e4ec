#![forbid(unsafe_code)]

//! Software-diagnostics cluster surface.
//!
//! Read-side façade over the platform's diagnostics provider: heap metrics
//! encode as plain values (`0` when the platform doesn't track them),
//! thread metrics as a list borrowed from the provider and released when
//! the snapshot drops. Attribute access goes through an explicit registry
//! rather than process-wide singletons; construction order is the caller's,
//! teardown happens at shutdown.

pub mod cluster;
pub mod provider;

pub use cluster::{
    AttributeAccess, AttributeValue, ClusterRegistry, CommandStatus, SoftwareDiagnostics,
};
pub use provider::{DiagnosticsProvider, SoftwareFault, ThreadMetric, ThreadMetricsSnapshot};

pub use weave_core::{Error, Result};

/// Software Diagnostics cluster id.
pub const SOFTWARE_DIAGNOSTICS_CLUSTER_ID: u32 = 0x0034;

/// Attribute ids served by this cluster.
pub mod attribute_ids {
    pub const THREAD_METRICS: u32 = 0x0000;
    pub const CURRENT_HEAP_FREE: u32 = 0x0001;
    pub const CURRENT_HEAP_USED: u32 = 0x0002;
    pub const CURRENT_HEAP_HIGH_WATERMARK: u32 = 0x0003;
    pub const FEATURE_MAP: u32 = 0xFFFC;
}

/// Feature-map bit: the platform tracks heap watermarks.
pub const FEATURE_WATERMARKS: u32 = 0x1;
