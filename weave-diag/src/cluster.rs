//! Attribute access and command handling for the software-diagnostics
//! cluster, plus the registry that replaces module-scoped singletons.

use tracing::{error, info};

use weave_core::{Error, Result};

use crate::provider::{DiagnosticsProvider, SoftwareFault, ThreadMetric};
use crate::{attribute_ids, FEATURE_WATERMARKS, SOFTWARE_DIAGNOSTICS_CLUSTER_ID};

/// Value produced by an attribute read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    U64(u64),
    U32(u32),
    ThreadMetricsList(Vec<ThreadMetric>),
}

/// Command reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
}

/// Cluster-side attribute reader registered with the [`ClusterRegistry`].
pub trait AttributeAccess {
    fn cluster_id(&self) -> u32;
    fn read(&mut self, attribute_id: u32) -> Result<AttributeValue>;
}

/// Software-diagnostics cluster bound to a platform provider.
pub struct SoftwareDiagnostics<P: DiagnosticsProvider> {
    provider: P,
}

impl<P: DiagnosticsProvider> SoftwareDiagnostics<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn read_if_supported(value: Result<u64>) -> Result<AttributeValue> {
        match value {
            Ok(v) => Ok(AttributeValue::U64(v)),
            Err(Error::Unsupported) => Ok(AttributeValue::U64(0)),
            Err(e) => Err(e),
        }
    }

    fn read_thread_metrics(&mut self) -> Result<AttributeValue> {
        match self.provider.thread_metrics() {
            // Collecting consumes the snapshot; its drop returns the list
            // to the provider.
            Ok(snapshot) => Ok(AttributeValue::ThreadMetricsList(snapshot.collect())),
            Err(_) => Ok(AttributeValue::ThreadMetricsList(Vec::new())),
        }
    }

    /// `ResetWatermarks` command.
    pub fn reset_watermarks(&mut self) -> CommandStatus {
        match self.provider.reset_watermarks() {
            Ok(()) => CommandStatus::Success,
            Err(e) => {
                error!(error = %e, "watermark reset failed");
                CommandStatus::Failure
            }
        }
    }

    /// Event hook for a detected software fault.
    pub fn on_software_fault(&self, fault: &SoftwareFault) {
        info!(
            fault_id = fault.id,
            fault_name = fault.name.as_deref().unwrap_or(""),
            "software fault detected"
        );
    }
}

impl<P: DiagnosticsProvider> AttributeAccess for SoftwareDiagnostics<P> {
    fn cluster_id(&self) -> u32 {
        SOFTWARE_DIAGNOSTICS_CLUSTER_ID
    }

    fn read(&mut self, attribute_id: u32) -> Result<AttributeValue> {
        match attribute_id {
            attribute_ids::CURRENT_HEAP_FREE => {
                Self::read_if_supported(self.provider.current_heap_free())
            }
            attribute_ids::CURRENT_HEAP_USED => {
                Self::read_if_supported(self.provider.current_heap_used())
            }
            attribute_ids::CURRENT_HEAP_HIGH_WATERMARK => {
                Self::read_if_supported(self.provider.current_heap_high_watermark())
            }
            attribute_ids::THREAD_METRICS => self.read_thread_metrics(),
            attribute_ids::FEATURE_MAP => {
                let mut features = 0;
                if self.provider.supports_watermarks() {
                    features |= FEATURE_WATERMARKS;
                }
                Ok(AttributeValue::U32(features))
            }
            _ => Err(Error::NotFound("attribute")),
        }
    }
}

/// Registry of attribute-access collaborators, keyed by cluster id.
#[derive(Default)]
pub struct ClusterRegistry {
    accessors: Vec<Box<dyn AttributeAccess>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accessor; one per cluster id.
    pub fn register(&mut self, access: Box<dyn AttributeAccess>) -> Result<()> {
        if self
            .accessors
            .iter()
            .any(|a| a.cluster_id() == access.cluster_id())
        {
            return Err(Error::IncorrectState("cluster already registered"));
        }
        self.accessors.push(access);
        Ok(())
    }

    /// Route a read to the cluster's accessor.
    pub fn read(&mut self, cluster_id: u32, attribute_id: u32) -> Result<AttributeValue> {
        let access = self
            .accessors
            .iter_mut()
            .find(|a| a.cluster_id() == cluster_id)
            .ok_or(Error::NotFound("cluster"))?;
        access.read(attribute_id)
    }

    /// Drop every accessor; called at stack shutdown.
    pub fn shutdown(&mut self) {
        self.accessors.clear();
    }
}
