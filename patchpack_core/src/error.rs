/// Failures callers are expected to branch on.
///
/// These travel inside `anyhow::Error`; use `err.downcast_ref::<PackError>()`
/// to recover them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error("scan subsets can only be selected when a block sidecar is supplied")]
    ScanFilterWithoutSidecar,
    #[error("scan indices were given but the sidecar contains no scan blocks")]
    NoScanBlocks,
    #[error("entity types were given but the sidecar contains no entity blocks")]
    NoEntityBlocks,
    #[error("patch index {index} out of range (archive holds {count} patches)")]
    PatchOutOfRange { index: u32, count: u32 },
}
