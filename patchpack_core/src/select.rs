use std::collections::BTreeSet;

use crate::block::{Block, BlockKind};
use crate::error::PackError;
use crate::ranges::IndexRanges;

/// Entity-type filter value that selects residual blocks.
pub const RESIDUAL_TYPE: &str = "residual";

/// Which blocks to restore. An empty set means "no restriction".
#[derive(Debug, Clone, Default)]
pub struct PatchFilter {
    /// Scan ordinals, counted over scan blocks only.
    pub scans: IndexRanges,
    /// IFC entity types, plus [`RESIDUAL_TYPE`] for residual blocks.
    pub entity_types: BTreeSet<String>,
}

impl PatchFilter {
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty() && self.entity_types.is_empty()
    }

    /// Reject filters that cannot match anything in `blocks` by construction.
    pub fn validate(&self, blocks: &[Block]) -> Result<(), PackError> {
        if !self.scans.is_empty() && !blocks.iter().any(|b| b.kind == BlockKind::Scan) {
            return Err(PackError::NoScanBlocks);
        }
        if !self.entity_types.is_empty() && !blocks.iter().any(|b| b.kind.is_entity()) {
            return Err(PackError::NoEntityBlocks);
        }
        Ok(())
    }

    fn accepts(&self, kind: &BlockKind, scan_ordinal: u32) -> bool {
        match kind {
            BlockKind::Scan => self.scans.is_empty() || self.scans.contains(scan_ordinal),
            BlockKind::IfcElement { entity_type, .. } => {
                self.entity_types.is_empty() || self.entity_types.contains(entity_type)
            }
            BlockKind::Residual => {
                self.entity_types.is_empty() || self.entity_types.contains(RESIDUAL_TYPE)
            }
            BlockKind::Undefined => false,
        }
    }
}

/// Global patch indices of every block `filter` accepts, deduplicated and
/// in ascending order.
///
/// The result is only as large as the blocks' interval lists; checking it
/// against an archive is left to [`crate::reconstruct`].
pub fn resolve_patches(blocks: &[Block], filter: &PatchFilter) -> IndexRanges {
    let mut scan_ordinal = 0u32;
    let mut selected = Vec::new();
    for block in blocks {
        let accepted = filter.accepts(&block.kind, scan_ordinal);
        if block.kind == BlockKind::Scan {
            scan_ordinal = scan_ordinal.saturating_add(1);
        }
        if accepted {
            selected.extend(block.patch_indices.ranges().iter().cloned());
        }
    }
    IndexRanges::from_ranges(selected)
}
