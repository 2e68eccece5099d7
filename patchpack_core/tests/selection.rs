/// Index lists, block sidecars and patch selection.
///
/// These cover the pieces that decide *which* patches are restored; the
/// archive round trips live in `integration.rs`.
use glam::{DVec3, Mat3, Vec3};
use patchpack_core::geometry::Aabb3;
use patchpack_core::ranges::parse_index_list_or_empty;
use patchpack_core::{
    encode_index_list, parse_index_list, read_sidecar, resolve_patches, write_sidecar, Block,
    BlockKind, IndexRanges, MergeTable, PackError, PatchFilter, PatchRow, RangeStyle,
    ScanMetadata,
};

// ── helpers ───────────────────────────────────────────────────────────────

fn set(values: &[u32]) -> IndexRanges {
    values.iter().copied().collect()
}

fn entity(entity_type: &str, indices: &[u32]) -> Block {
    Block {
        kind: BlockKind::IfcElement {
            guid: format!("guid-{entity_type}"),
            entity_type: entity_type.to_string(),
        },
        patch_indices: set(indices),
    }
}

fn residual(indices: &[u32]) -> Block {
    Block {
        kind: BlockKind::Residual,
        patch_indices: set(indices),
    }
}

fn types(names: &[&str]) -> PatchFilter {
    PatchFilter {
        entity_types: names.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn scan_metadata(ordinal: u32, patches: u32) -> ScanMetadata {
    ScanMetadata {
        origin: DVec3::new(ordinal as f64, 0.0, 1.5),
        ordinal,
        bbox_sensor: Aabb3 {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        },
        patches: (0..patches)
            .map(|i| PatchRow {
                point_count: 10 + i,
                origin: Vec3::new(i as f32, ordinal as f32, 0.0),
                bbox: Aabb3 {
                    min: Vec3::ZERO,
                    max: Vec3::new(1.0, 2.0, 0.5),
                },
                basis: Mat3::from_rotation_z(0.3 * i as f32),
            })
            .collect(),
    }
}

// ── index lists ──────────────────────────────────────────────────────────

#[test]
fn test_parse_ranges_and_singles() {
    assert_eq!(parse_index_list("3-5 7").unwrap(), set(&[3, 4, 5, 7]));
    assert_eq!(parse_index_list("3 - 5\t7\n").unwrap(), set(&[3, 4, 5, 7]));
    assert_eq!(parse_index_list("0").unwrap(), set(&[0]));
}

#[test]
fn test_parse_collapses_overlaps() {
    assert_eq!(parse_index_list("1-4 3-6 5 5").unwrap(), set(&[1, 2, 3, 4, 5, 6]));
}

#[test]
fn test_parse_edge_cases() {
    assert!(parse_index_list("").unwrap().is_empty());
    assert!(parse_index_list("   ").unwrap().is_empty());
    // reversed ranges are well-formed but empty
    assert!(parse_index_list("5-3").unwrap().is_empty());
    assert_eq!(
        parse_index_list("4294967295").unwrap(),
        set(&[u32::MAX])
    );
}

#[test]
fn test_parse_rejects_malformed_lists_entirely() {
    for bad in ["3-", "-4", "a", "1,2", "1-2-3", "1 2 x", "4294967296", "7-8 9-"] {
        assert!(parse_index_list(bad).is_err(), "{bad:?} should not parse");
        assert!(parse_index_list_or_empty(bad).is_empty());
    }
}

#[test]
fn test_encode_runs() {
    assert_eq!(encode_index_list(&[3, 4, 5, 7], RangeStyle::Exact), "3-5 7");
    assert_eq!(encode_index_list(&[3, 4, 5, 7], RangeStyle::Legacy), "3-5 7");
    assert_eq!(encode_index_list(&[1, 2, 3], RangeStyle::Legacy), "1-3");
    assert_eq!(encode_index_list(&[1, 2], RangeStyle::Exact), "1-2");
    assert_eq!(encode_index_list(&[], RangeStyle::Exact), "");
    assert_eq!(encode_index_list(&[u32::MAX - 1, u32::MAX], RangeStyle::Exact), "4294967294-4294967295");
}

/// Documents the legacy writer's behavior: a run of exactly two values
/// keeps only its first value.
#[test]
fn test_legacy_style_drops_second_value_of_pairs() {
    assert_eq!(encode_index_list(&[1, 2], RangeStyle::Legacy), "1");

    let indices = [1, 2, 5, 7, 8, 9, 20, 21];
    let text = encode_index_list(&indices, RangeStyle::Legacy);
    assert_eq!(text, "1 5 7-9 20");
    assert_eq!(parse_index_list(&text).unwrap(), set(&[1, 5, 7, 8, 9, 20]));
}

#[test]
fn test_exact_style_round_trips() {
    let indices = [0, 1, 4, 6, 7, 8, 100, 102, 103];
    let text = encode_index_list(&indices, RangeStyle::Exact);
    assert_eq!(text, "0-1 4 6-8 100 102-103");
    assert_eq!(parse_index_list(&text).unwrap(), set(&indices));
}

#[test]
fn test_decode_is_stable_on_its_own_output() {
    for text in ["3-5 7", "9 1-3 2", "0-0 5-4 8", ""] {
        let decoded = parse_index_list(text).unwrap();
        let again: Vec<u32> = decoded.iter().collect();
        let reencoded = encode_index_list(&again, RangeStyle::Exact);
        assert_eq!(parse_index_list(&reencoded).unwrap(), decoded, "{text:?}");
    }
}

// ── sidecar ─────────────────────────────────────────────────────────────────

#[test]
fn test_sidecar_preserves_blocks() {
    let blocks = vec![
        Block::scan(0..3),
        entity("IfcWall", &[3, 4, 5, 6]),
        residual(&[7, 9]),
        Block {
            kind: BlockKind::Undefined,
            patch_indices: IndexRanges::new(),
        },
    ];
    let mut json = Vec::new();
    write_sidecar(&mut json, &blocks, RangeStyle::Exact).unwrap();
    assert_eq!(read_sidecar(json.as_slice()).unwrap(), blocks);
}

#[test]
fn test_sidecar_field_order_and_shape() {
    let mut json = Vec::new();
    write_sidecar(&mut json, &[entity("IfcSlab", &[0, 1, 2])], RangeStyle::Exact).unwrap();
    let text = String::from_utf8(json).unwrap();

    let positions: Vec<usize> = ["\"type\"", "\"entity_guid\"", "\"entity_type\"", "\"patch_indices\""]
        .iter()
        .map(|key| text.find(key).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
    assert!(text.contains("\"ifc_element\""));
    assert!(text.contains("\"0-2\""));
}

#[test]
fn test_sidecar_unknown_type_and_bad_indices_degrade() {
    let json = r#"{"blocks": [
        {"type": "mesh", "entity_guid": "", "entity_type": "", "patch_indices": "0-3"},
        {"type": "scan", "entity_guid": "", "entity_type": "", "patch_indices": "4-x"},
        {"type": "residual", "patch_indices": "8"}
    ]}"#;
    let blocks = read_sidecar(json.as_bytes()).unwrap();
    assert_eq!(blocks[0].kind, BlockKind::Undefined);
    assert_eq!(blocks[0].patch_indices, set(&[0, 1, 2, 3]));
    assert_eq!(blocks[1].kind, BlockKind::Scan);
    assert!(blocks[1].patch_indices.is_empty());
    assert_eq!(blocks[2].kind, BlockKind::Residual);
    assert_eq!(blocks[2].patch_indices, set(&[8]));
}

#[test]
fn test_sidecar_rejects_broken_json() {
    assert!(read_sidecar(r#"{"blocks": [{"type": "scan""#.as_bytes()).is_err());
}

// ── selection ───────────────────────────────────────────────────────────────

#[test]
fn test_empty_filter_selects_union_of_all_blocks() {
    let blocks = vec![
        Block::scan(0..3),
        entity("IfcWall", &[2, 3, 4]),
        residual(&[4, 8]),
    ];
    let selected = resolve_patches(&blocks, &PatchFilter::default());
    assert_eq!(selected, set(&[0, 1, 2, 3, 4, 8]));
    assert!(selected.iter().zip(selected.iter().skip(1)).all(|(a, b)| a < b));
}

#[test]
fn test_scan_filter_selects_one_scan() {
    let blocks = vec![Block::scan(0..3), Block::scan(3..6), Block::scan(6..9)];
    let filter = PatchFilter {
        scans: set(&[1]),
        ..Default::default()
    };
    assert_eq!(resolve_patches(&blocks, &filter), set(&[3, 4, 5]));
}

#[test]
fn test_scan_ordinals_ignore_interleaved_entity_blocks() {
    let blocks = vec![
        Block::scan(0..2),
        entity("IfcDoor", &[2]),
        residual(&[3]),
        Block::scan(4..6),
    ];
    let filter = PatchFilter {
        scans: set(&[1]),
        ..Default::default()
    };
    // Entity blocks pass because the entity filter is empty.
    assert_eq!(resolve_patches(&blocks, &filter), set(&[2, 3, 4, 5]));
}

#[test]
fn test_entity_type_filter() {
    let blocks = vec![
        Block::scan(0..2),
        entity("IfcWall", &[2, 3]),
        entity("IfcDoor", &[4]),
        residual(&[5, 6]),
        Block {
            kind: BlockKind::Undefined,
            patch_indices: set(&[7]),
        },
    ];

    assert_eq!(resolve_patches(&blocks, &types(&["IfcWall"])), set(&[0, 1, 2, 3]));
    assert_eq!(resolve_patches(&blocks, &types(&["residual"])), set(&[0, 1, 5, 6]));
    assert_eq!(
        resolve_patches(&blocks, &types(&["IfcDoor", "residual"])),
        set(&[0, 1, 4, 5, 6])
    );
    // undefined blocks are never selected
    assert!(!resolve_patches(&blocks, &PatchFilter::default()).contains(7));
}

#[test]
fn test_validation_rejects_unmatchable_filters() {
    let scans_only = vec![Block::scan(0..3), Block::scan(3..6)];
    assert_eq!(
        types(&["residual"]).validate(&scans_only),
        Err(PackError::NoEntityBlocks)
    );

    let entities_only = vec![entity("IfcWall", &[0]), residual(&[1])];
    let filter = PatchFilter {
        scans: set(&[0]),
        ..Default::default()
    };
    assert_eq!(filter.validate(&entities_only), Err(PackError::NoScanBlocks));

    assert!(types(&["residual"]).validate(&entities_only).is_ok());
    assert!(PatchFilter::default().validate(&[]).is_ok());
}

// ── merge table ─────────────────────────────────────────────────────────────

#[test]
fn test_merge_table_assigns_dense_indices() {
    let table = MergeTable::new();
    let (table, first) = table.with_scan(scan_metadata(0, 3)).unwrap();
    let (table, second) = table.with_scan(scan_metadata(1, 4)).unwrap();

    assert_eq!(first, 0..3);
    assert_eq!(second, 3..7);
    assert_eq!(table.patch_count(), 7);
    assert_eq!(table.patch(3).unwrap().origin, Vec3::new(0.0, 1.0, 0.0));
    assert!(table.patch(7).is_none());
    assert_eq!(table.scan_of(3).unwrap().origin, DVec3::new(1.0, 0.0, 1.5));
    assert_eq!(table.total_point_count(), (10 + 11 + 12) + (10 + 11 + 12 + 13));
    assert_eq!(table.scans()[1].bbox_basis.max, Vec3::new(1.0, 2.0, 0.5));
}

#[test]
fn test_merge_table_serialization() {
    let (table, _) = MergeTable::new().with_scan(scan_metadata(0, 2)).unwrap();
    let (table, _) = table.with_scan(scan_metadata(1, 0)).unwrap();
    let (mut table, _) = table.with_scan(scan_metadata(2, 3)).unwrap();
    // Survey coordinates need the full f64 origin.
    let (georeferenced, _) = MergeTable::new()
        .with_scan(ScanMetadata {
            origin: DVec3::new(512_345.678, 5_000_000.3, 231.125),
            ..scan_metadata(3, 1)
        })
        .unwrap();
    table = table.merge(georeferenced).unwrap();

    let bytes = table.to_bytes();
    let decoded = MergeTable::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, table);
    assert_eq!(decoded.scans()[3].origin.y, 5_000_000.3);

    let mut trailing = bytes.clone();
    trailing.push(0);
    assert!(MergeTable::from_bytes(&trailing).is_err());
    assert!(MergeTable::from_bytes(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn test_merging_independent_tables_rebases_blocks() {
    let (left, left_range) = MergeTable::new().with_scan(scan_metadata(0, 2)).unwrap();
    let (right, right_range) = MergeTable::new().with_scan(scan_metadata(1, 3)).unwrap();
    let offset = left.patch_count();

    let merged = left.merge(right).unwrap();
    let blocks = vec![
        Block::scan(left_range),
        Block::scan(right_range).shifted(offset).unwrap(),
    ];

    assert_eq!(merged.patch_count(), 5);
    assert_eq!(blocks[1].patch_indices, set(&[2, 3, 4]));
    assert_eq!(merged.patch(2).unwrap().origin, Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(merged.scan_of(2).unwrap().ordinal, 1);
}

#[test]
fn test_shifting_past_the_index_space_fails() {
    let block = Block::scan(0..3);
    let shifted = block.clone().shifted(u32::MAX - 2).unwrap();
    assert_eq!(shifted.patch_indices.last(), Some(u32::MAX));
    assert!(block.shifted(u32::MAX - 1).is_err());
}

// ── interval sets ───────────────────────────────────────────────────────────

/// A ten-byte list naming every u32 must not expand into four billion
/// entries anywhere between the text and the resolver.
#[test]
fn test_whole_index_space_stays_compact() {
    let all = parse_index_list("0-4294967295").unwrap();
    assert_eq!(all.len(), 1 << 32);
    assert_eq!(all.ranges().len(), 1);
    assert!(all.contains(0) && all.contains(u32::MAX));
    assert_eq!(all.to_text(RangeStyle::Exact), "0-4294967295");

    let json = r#"{"blocks": [
        {"type": "scan", "patch_indices": "0-4294967295"},
        {"type": "residual", "patch_indices": "7 100-200"}
    ]}"#;
    let blocks = read_sidecar(json.as_bytes()).unwrap();
    let selected = resolve_patches(&blocks, &PatchFilter::default());
    assert_eq!(selected, all);

    let filter = PatchFilter {
        scans: parse_index_list("0-4294967295").unwrap(),
        ..Default::default()
    };
    assert_eq!(resolve_patches(&blocks, &filter).last(), Some(u32::MAX));
}

#[test]
fn test_interval_sets_coalesce() {
    let ranges = IndexRanges::from_ranges([8..=9, 0..=2, 3..=3, 6..=4, 1..=1, 11..=12]);
    assert_eq!(ranges.ranges(), &[0..=3, 8..=9, 11..=12]);
    assert_eq!(ranges.len(), 8);
    assert_eq!(ranges.first(), Some(0));
    assert_eq!(ranges.last(), Some(12));
    assert!(ranges.contains(9));
    assert!(!ranges.contains(10));
    assert!(!ranges.contains(13));

    let joined = ranges.union(&set(&[10]));
    assert_eq!(joined.ranges(), &[0..=3, 8..=12]);

    assert!(IndexRanges::from_range(5..5).is_empty());
    assert_eq!(IndexRanges::from_range(2..5), set(&[2, 3, 4]));
}
