mod las_io;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use patchpack_codecs::{codec_by_name, codec_set_for, image_codec_by_name, PngCodec};
use patchpack_core::{
    build_archive, parse_index_list, read_sidecar, reconstruct, resolve_patches, write_sidecar,
    ArchiveHeader, ArchiveReader, ArchiveWriter, Block, CodecSet, CompressionMode,
    CompressionParams, IndexRanges, OctreeDecomposer, PackError, PatchFilter, RangeStyle,
};

use crate::las_io::{write_las, LasScanSource};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "patchpack",
    about = "Compress point-cloud scans into patch archives and restore selected parts of them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress one or more scans into a patch archive
    Compress(CompressArgs),
    /// Restore all or a filtered subset of an archive's patches as points
    Decompress(DecompressArgs),
    /// Print header, codec and merge-table statistics
    Inspect {
        /// Archive to inspect
        file: PathBuf,
        /// Print per-patch rows
        #[arg(long)]
        patches: bool,
    },
}

#[derive(Args)]
struct CompressArgs {
    /// Scan files (LAS/LAZ), one per scan, in scan order
    #[arg(short, long = "input-cloud", required = true, num_args = 1..)]
    input: Vec<PathBuf>,
    /// IFC model (only together with --input-reg)
    #[arg(short = 'm', long)]
    input_ifc: Option<PathBuf>,
    /// Registration of the IFC model against the scans (only together with --input-ifc)
    #[arg(short = 'r', long)]
    input_reg: Option<PathBuf>,
    /// Destination archive
    #[arg(short, long)]
    output: PathBuf,
    /// Optional block sidecar (JSON) to write
    #[arg(short = 'j', long)]
    output_json: Option<PathBuf>,
    /// Single compression knob in [0,1]; overrides img-size, blur, quality and max points per cell
    #[arg(long)]
    ratio: Option<f32>,
    /// Patch raster width and height
    #[arg(short = 's', long, default_value_t = 32)]
    img_size: u32,
    /// Blur passes filling empty height-field cells
    #[arg(short, long, default_value_t = 8)]
    blur_iterations: u32,
    /// Point count above which octree cells are split (default: img-size²)
    #[arg(long)]
    max_points_per_cell: Option<u32>,
    /// Point count below which octree cells are never split
    #[arg(long, default_value_t = 3)]
    min_points: u32,
    /// Height-field codec quality (1–100)
    #[arg(short, long, default_value_t = 75)]
    quality: u8,
    /// Largest standard deviation off the plane accepted for one patch
    #[arg(long, default_value_t = 0.05)]
    dist_threshold: f32,
    /// Largest surface variation accepted for one patch
    #[arg(long, default_value_t = 0.05)]
    angle_threshold: f32,
    #[arg(long, default_value_t = 6)]
    max_octree_depth: u32,
    #[arg(long, default_value_t = 0.2)]
    min_octree_leaf_size: f32,
    /// Merge table codec: passthrough | zstd | lz4 | zlib
    #[arg(long, default_value = "zstd")]
    table_codec: String,
    /// Zstd level for the merge table (1–22)
    #[arg(long, default_value_t = 3)]
    zstd_level: i32,
    /// Height-field codec: jpeg | png
    #[arg(long, default_value = "jpeg")]
    height_codec: String,
    /// Write two-element index runs the way early sidecars did (first value only)
    #[arg(long)]
    legacy_ranges: bool,
}

#[derive(Args)]
struct DecompressArgs {
    /// Archive to restore from
    #[arg(short, long = "input-cloud")]
    input: PathBuf,
    /// Block sidecar written at compression time
    #[arg(short = 'j', long)]
    input_json: Option<PathBuf>,
    /// Destination LAS file
    #[arg(short, long)]
    output: PathBuf,
    /// Scans to restore, e.g. "0-2 5" (requires --input-json)
    #[arg(short, long)]
    scan_indices: Option<String>,
    /// Entity types to restore; "residual" selects residual geometry
    #[arg(short = 't', long = "ifc-types")]
    ifc_types: Vec<String>,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn create_parent_dirs(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {:?}", parent))?;
        }
    }
    Ok(())
}

fn open_archive(path: &Path) -> anyhow::Result<ArchiveReader> {
    let header = ArchiveHeader::read_from_path(path)
        .with_context(|| format!("reading archive header of {:?}", path))?;
    let codecs = codec_set_for(&header)?;
    ArchiveReader::open(path, codecs)
}

impl CompressArgs {
    fn params(&self) -> anyhow::Result<CompressionParams> {
        let mode = match (&self.input_ifc, &self.input_reg) {
            (None, None) => CompressionMode::PerScan,
            (Some(model), Some(registration)) => CompressionMode::EntityAligned {
                model: model.clone(),
                registration: registration.clone(),
            },
            _ => anyhow::bail!("options --input-ifc and --input-reg may only be used together"),
        };

        let mut params = match self.ratio {
            Some(r) if (0.0..=1.0).contains(&r) => CompressionParams::from_ratio(r),
            Some(r) => anyhow::bail!("--ratio must lie in [0, 1], got {}", r),
            None => {
                let mut params = CompressionParams {
                    img_size: self.img_size.max(1),
                    blur_iterations: self.blur_iterations,
                    quality: self.quality.clamp(1, 100),
                    ..CompressionParams::default()
                };
                params.decomposition.max_points_per_cell = self
                    .max_points_per_cell
                    .unwrap_or(params.img_size * params.img_size);
                params
            }
        };
        params.mode = mode;
        params.decomposition.min_points = self.min_points;
        params.decomposition.dist_threshold = self.dist_threshold;
        params.decomposition.angle_threshold = self.angle_threshold;
        params.decomposition.max_depth = self.max_octree_depth;
        params.decomposition.min_leaf_size = self.min_octree_leaf_size;
        Ok(params)
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(args: CompressArgs) -> anyhow::Result<()> {
    let params = args.params()?;
    for path in &args.input {
        if !path.exists() {
            anyhow::bail!("input scan {:?} does not exist", path);
        }
    }

    let codecs = CodecSet {
        table: codec_by_name(&args.table_codec, args.zstd_level)?,
        occupancy: std::sync::Arc::new(PngCodec),
        height: image_codec_by_name(&args.height_codec)?,
    };

    create_parent_dirs(&args.output)?;
    let writer = ArchiveWriter::create(&args.output, codecs.clone())
        .with_context(|| format!("creating output file {:?}", args.output))?;

    let t0 = Instant::now();
    let mut source = LasScanSource::new(args.input.clone());
    let (summary, blocks) = build_archive(&mut source, &OctreeDecomposer, &params, writer)?;
    let elapsed = t0.elapsed();

    if let Some(json) = &args.output_json {
        create_parent_dirs(json)?;
        let style = if args.legacy_ranges {
            RangeStyle::Legacy
        } else {
            RangeStyle::Exact
        };
        let out = File::create(json).with_context(|| format!("creating sidecar {:?}", json))?;
        write_sidecar(BufWriter::new(out), &blocks, style)?;
    }

    eprintln!("  codecs      : {:?}", codecs);
    eprintln!("  raster      : {0}x{0}", params.img_size);
    eprintln!("  scans       : {}", summary.scan_count);
    eprintln!("  patches     : {}", summary.patch_count);
    eprintln!("  points      : {}", summary.point_count);
    eprintln!("  chunks      : {}", human_bytes(summary.chunk_bytes));
    eprintln!("  table       : {}", human_bytes(summary.table_bytes));
    eprintln!("  archive     : {}", human_bytes(summary.file_bytes));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(args: DecompressArgs) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("input archive {:?} does not exist", args.input);
    }

    let scans = match &args.scan_indices {
        Some(text) => parse_index_list(text)
            .with_context(|| format!("parsing --scan-indices {:?}", text))?,
        None => IndexRanges::new(),
    };
    let filter = PatchFilter {
        scans,
        entity_types: args.ifc_types.iter().cloned().collect(),
    };

    let sidecar = args.input_json.as_ref().filter(|p| p.exists());
    if let (Some(path), None) = (&args.input_json, sidecar) {
        log::warn!("sidecar {:?} does not exist; ignoring it", path);
    }
    if sidecar.is_none() && !filter.scans.is_empty() {
        return Err(PackError::ScanFilterWithoutSidecar.into());
    }
    let blocks: Option<Vec<Block>> = match sidecar {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening sidecar {:?}", path))?;
            Some(read_sidecar(BufReader::new(file))?)
        }
        None => None,
    };
    if let Some(blocks) = &blocks {
        filter.validate(blocks)?;
    } else if !filter.entity_types.is_empty() {
        return Err(PackError::NoEntityBlocks.into());
    }

    log::info!("reading compressed archive");
    let mut reader = open_archive(&args.input)?;
    if filter.is_empty() {
        log::info!("no filter given; restoring every block");
    }
    let patches = match &blocks {
        Some(blocks) => resolve_patches(blocks, &filter),
        None => IndexRanges::from_range(0..reader.patch_count()),
    };

    log::info!("decompressing {} of {} patches", patches.len(), reader.patch_count());
    let t0 = Instant::now();
    let points = reconstruct(&mut reader, &patches)?;
    let elapsed = t0.elapsed();

    create_parent_dirs(&args.output)?;
    write_las(&args.output, &points)?;

    eprintln!("  patches     : {}", patches.len());
    eprintln!("  points      : {}", points.len());
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_patches: bool) -> anyhow::Result<()> {
    let reader = open_archive(&file)?;
    let file_size = std::fs::metadata(&file)?.len();
    let header = &reader.header;
    let table = reader.table();
    let codecs = reader.codecs();

    println!("=== Patch archive: {:?} ===", file);
    println!();
    println!("  format version : {}", header.version);
    println!("  table codec    : {} (id={})", codecs.table.name(), header.table_codec);
    println!("  occupancy codec: {} (id={})", codecs.occupancy.name(), header.occupancy_codec);
    println!("  height codec   : {} (id={})", codecs.height.name(), header.height_codec);
    println!("  scans          : {}", table.scan_count());
    println!("  patches        : {}", table.patch_count());
    println!("  points         : {}", table.total_point_count());
    println!(
        "  table          : {} ({} raw)",
        human_bytes(header.table_len as u64),
        human_bytes(header.table_raw_len as u64)
    );
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  flags          : 0x{:016x}", header.flags);

    println!();
    println!(
        "  {:>6}  {:>8}  {:>28}  {:>28}",
        "scan", "patches", "origin", "extent (sensor space)"
    );
    println!("  {}", "-".repeat(76));
    for scan in table.scans() {
        let o = scan.origin;
        let e = scan.bbox_sensor.extent();
        println!(
            "  {:>6}  {:>8}  {:>28}  {:>28}",
            scan.ordinal,
            scan.patch_count,
            format!("{:.2} {:.2} {:.2}", o.x, o.y, o.z),
            format!("{:.2} {:.2} {:.2}", e.x, e.y, e.z),
        );
    }

    if show_patches {
        println!();
        println!(
            "  {:>8}  {:>8}  {:>28}  {:>12}  {:>12}",
            "patch", "points", "origin", "occupancy", "height"
        );
        println!("  {}", "-".repeat(76));
        let entries = reader.entries();
        for (i, row) in table.patches().iter().enumerate() {
            let o = row.origin;
            println!(
                "  {:>8}  {:>8}  {:>28}  {:>12}  {:>12}",
                i,
                row.point_count,
                format!("{:.2} {:.2} {:.2}", o.x, o.y, o.z),
                human_bytes(entries[2 * i].len as u64),
                human_bytes(entries[2 * i + 1].len as u64),
            );
        }
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compress(args) => run_compress(args),
        Commands::Decompress(args) => run_decompress(args),
        Commands::Inspect { file, patches } => run_inspect(file, patches),
    }
}
