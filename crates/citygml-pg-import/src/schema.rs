//! Schema capability probe.
//!
//! Optional schema features are detected once per run from the target's
//! metadata and cached; importers consult the cached flags instead of
//! re-querying or comparing version numbers per entity.

use crate::error::Result;
use crate::target::BulkSink;
use tracing::info;

/// Optional schema features gating conditional columns and statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFeature {
    /// `cityobject.gmlid_codespace` column.
    GmlIdCodespace,

    /// `relief_feature.extent` geometry column.
    ReliefExtent,
}

/// Capability flags computed once at run start.
#[derive(Debug, Clone, Copy)]
pub struct SchemaCapabilities {
    version: u32,
    gml_id_codespace: bool,
    relief_extent: bool,
}

impl SchemaCapabilities {
    /// Probe the target once and derive the capability flags.
    pub async fn probe(sink: &dyn BulkSink) -> Result<Self> {
        let version = sink.schema_version().await?;
        let caps = Self::from_version(version);
        info!(
            "Target schema version {}: gmlid_codespace={}, relief_extent={}",
            version, caps.gml_id_codespace, caps.relief_extent
        );
        Ok(caps)
    }

    /// Derive capability flags from a schema version number.
    pub fn from_version(version: u32) -> Self {
        Self {
            version,
            gml_id_codespace: version >= 4,
            relief_extent: version >= 4,
        }
    }

    /// Whether the active schema carries `feature`.
    pub fn supports(&self, feature: SchemaFeature) -> bool {
        match feature {
            SchemaFeature::GmlIdCodespace => self.gml_id_codespace,
            SchemaFeature::ReliefExtent => self.relief_extent,
        }
    }

    /// The probed schema version.
    pub fn version(&self) -> u32 {
        self.version
    }
}
