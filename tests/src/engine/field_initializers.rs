use crate::support::{count_occurrences, init_tracing, world_class, world_source};
use classpatch_core::source::MemoryClassSource;
use classpatch_core::unit::MemberKind;
use classpatch_engine::field_init;
use classpatch_engine::patcher::{Patcher, PatcherConfig};
use std::sync::Arc;

#[test]
fn double_initializer_correlates_exactly_twice() {
    init_tracing();
    let source = world_source();
    let mut unit = world_class();
    let constructor = unit.declared_constructors()[0];
    let (code, pool) = unit.member_code_and_pool(constructor).unwrap();

    let sites = field_init::correlate(code, pool, &source, "grid", "game.Grid").unwrap();
    assert_eq!(sites.len(), 2, "the call between the pairs is not between either pair");
    assert!(sites.iter().all(|s| s.constructed_type == "game.Grid"));
    assert!(sites[0].end <= sites[1].start);
}

#[test]
fn replacement_fragment_lands_once_per_correlated_site() {
    init_tracing();
    let patcher =
        Patcher::new(PatcherConfig::new(Arc::new(world_source()))).expect("construct patcher");
    patcher
        .load_document(
            r#"<patches><fixes>
                 <patch id="net.example.World">
                   <replaceFieldInitializer field="grid" code="LOG();"/>
                 </patch>
               </fixes></patches>"#,
        )
        .expect("load document");
    let patched = patcher.patch("net.example.World", b"original");
    assert_eq!(
        count_occurrences(&patched, "LOG();"),
        2,
        "exactly the two correlated sites must be rewritten"
    );
}

#[test]
fn intervening_cast_invalidates_the_candidate() {
    init_tracing();
    let source = MemoryClassSource::new();
    let mut unit = world_class();
    // new game.Grid, dup, invokespecial <init>, checkcast, putfield grid
    let grid_class = unit.pool.add_class("game.Grid");
    let grid_init = unit.pool.add_method_ref("game.Grid", "<init>", "()void");
    let grid_field = unit
        .pool
        .add_field_ref("net.example.World", "grid", "game.Grid");
    let mut bytes = vec![0x2a, 0xbb];
    bytes.extend(grid_class.to_be_bytes());
    bytes.push(0x59);
    bytes.push(0xb7);
    bytes.extend(grid_init.to_be_bytes());
    bytes.push(0xc0); // checkcast
    bytes.extend(grid_class.to_be_bytes());
    bytes.push(0xb5);
    bytes.extend(grid_field.to_be_bytes());
    bytes.push(0xb1);
    let member = unit
        .add_member(
            MemberKind::Method,
            "rebuild",
            Vec::new(),
            Some("void".to_string()),
            Default::default(),
            classpatch_core::code::CodeBody::new(bytes),
        )
        .unwrap();

    let (code, pool) = unit.member_code_and_pool(member).unwrap();
    let sites = field_init::correlate(code, pool, &source, "grid", "game.Grid").unwrap();
    assert!(sites.is_empty(), "a cast between construction and write must invalidate");
}

#[test]
fn subtype_constructions_still_correlate() {
    init_tracing();
    let source = MemoryClassSource::new();
    source.set_supertype("game.HexGrid", "game.Grid");
    let mut unit = world_class();
    let hex_class = unit.pool.add_class("game.HexGrid");
    let hex_init = unit.pool.add_method_ref("game.HexGrid", "<init>", "()void");
    let grid_field = unit
        .pool
        .add_field_ref("net.example.World", "grid", "game.Grid");
    let mut bytes = vec![0x2a, 0xbb];
    bytes.extend(hex_class.to_be_bytes());
    bytes.push(0x59);
    bytes.push(0xb7);
    bytes.extend(hex_init.to_be_bytes());
    bytes.push(0xb5);
    bytes.extend(grid_field.to_be_bytes());
    bytes.push(0xb1);
    let member = unit
        .add_member(
            MemberKind::Method,
            "rebuild",
            Vec::new(),
            Some("void".to_string()),
            Default::default(),
            classpatch_core::code::CodeBody::new(bytes),
        )
        .unwrap();

    let (code, pool) = unit.member_code_and_pool(member).unwrap();
    let sites = field_init::correlate(code, pool, &source, "grid", "game.Grid").unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].constructed_type, "game.HexGrid");
}
