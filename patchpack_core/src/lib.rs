pub mod block;
pub mod codec;
pub mod decompose;
pub mod error;
pub mod format;
pub mod geometry;
pub mod merge_table;
pub mod patch;
pub mod pipeline;
pub mod ranges;
pub mod reader;
pub mod select;
pub mod writer;

pub use block::{read_sidecar, write_sidecar, Block, BlockKind};
pub use codec::{Codec, CodecSet, Grid, ImageCodec};
pub use decompose::{Decomposer, DecompositionParams, OctreeDecomposer, PointCloud, Subset};
pub use error::PackError;
pub use format::{ArchiveHeader, ChunkEntry, HEADER_SIZE, MAGIC};
pub use merge_table::{MergeTable, PatchRow, ScanMetadata, ScanRow};
pub use pipeline::{
    build_archive, reconstruct, CompressionMode, CompressionParams, MemoryScanSource, ScanSource,
};
pub use ranges::{encode_index_list, parse_index_list, IndexRanges, RangeStyle};
pub use reader::ArchiveReader;
pub use select::{resolve_patches, PatchFilter};
pub use writer::{ArchiveSummary, ArchiveWriter, PatchChunks};
