use std::io::{Read, Write};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::ranges::{parse_index_list_or_empty, IndexRanges, RangeStyle};

/// What a block's patches were produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// One input scan. Scan blocks are numbered by their position among the
    /// scan blocks of a sidecar, not by their position in the block list.
    Scan,
    /// One modeled building element, identified by its IFC GUID and type.
    IfcElement { guid: String, entity_type: String },
    /// Geometry that no modeled element claimed.
    Residual,
    Undefined,
}

impl BlockKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            BlockKind::Scan => "scan",
            BlockKind::IfcElement { .. } => "ifc_element",
            BlockKind::Residual => "residual",
            BlockKind::Undefined => "undefined",
        }
    }

    /// True for blocks an entity-type filter can select.
    pub fn is_entity(&self) -> bool {
        matches!(self, BlockKind::IfcElement { .. } | BlockKind::Residual)
    }
}

/// A logical group of global patch indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Global patch indices.
    pub patch_indices: IndexRanges,
}

impl Block {
    /// Block for a scan whose patches were assigned `range`.
    pub fn scan(range: Range<u32>) -> Self {
        Self {
            kind: BlockKind::Scan,
            patch_indices: IndexRanges::from_range(range),
        }
    }

    /// Re-base this block's indices after its table was appended behind
    /// `offset` patches of another table.
    pub fn shifted(self, offset: u32) -> anyhow::Result<Self> {
        let patch_indices = self.patch_indices.shifted(offset).ok_or_else(|| {
            anyhow::anyhow!(
                "shifting {} block by {} overflows the patch index space",
                self.kind.type_name(),
                offset
            )
        })?;
        Ok(Self {
            kind: self.kind,
            patch_indices,
        })
    }

    fn to_record(&self, style: RangeStyle) -> BlockRecord {
        let (entity_guid, entity_type) = match &self.kind {
            BlockKind::IfcElement { guid, entity_type } => (guid.clone(), entity_type.clone()),
            _ => (String::new(), String::new()),
        };
        BlockRecord {
            kind: self.kind.type_name().to_string(),
            entity_guid,
            entity_type,
            patch_indices: self.patch_indices.to_text(style),
        }
    }

    fn from_record(record: BlockRecord) -> Self {
        let kind = match record.kind.as_str() {
            "scan" => BlockKind::Scan,
            "ifc_element" => BlockKind::IfcElement {
                guid: record.entity_guid,
                entity_type: record.entity_type,
            },
            "residual" => BlockKind::Residual,
            _ => BlockKind::Undefined,
        };
        Self {
            kind,
            patch_indices: parse_index_list_or_empty(&record.patch_indices),
        }
    }
}

/// On-disk shape of one block. Field order is part of the sidecar format.
#[derive(Debug, Serialize, Deserialize)]
struct BlockRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    entity_guid: String,
    #[serde(default)]
    entity_type: String,
    #[serde(default)]
    patch_indices: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    blocks: Vec<BlockRecord>,
}

/// Write `blocks` as a pretty-printed JSON sidecar.
pub fn write_sidecar<W: Write>(out: W, blocks: &[Block], style: RangeStyle) -> anyhow::Result<()> {
    let sidecar = Sidecar {
        blocks: blocks.iter().map(|b| b.to_record(style)).collect(),
    };
    serde_json::to_writer_pretty(out, &sidecar)?;
    Ok(())
}

/// Read the blocks of a JSON sidecar.
///
/// Structural JSON errors fail the read; a malformed `patch_indices` string
/// only empties that block (with a logged warning).
pub fn read_sidecar<R: Read>(input: R) -> anyhow::Result<Vec<Block>> {
    let sidecar: Sidecar = serde_json::from_reader(input)?;
    Ok(sidecar.blocks.into_iter().map(Block::from_record).collect())
}
