use crate::support::world_class;
use classpatch_core::source::{ClassSource, MemoryClassSource};

#[test]
fn fixture_class_decodes_cleanly() {
    let unit = world_class();
    for member in unit.members() {
        let instructions = member.code.decode().expect("fixture code must decode");
        assert!(!instructions.is_empty());
        assert_eq!(
            member.code.stack_map().len(),
            instructions.len(),
            "stack map entries track instruction starts"
        );
    }
}

#[test]
fn serialization_is_deterministic() {
    assert_eq!(world_class().serialize(), world_class().serialize());
}

#[test]
fn source_hands_out_independent_units() {
    let source = MemoryClassSource::new();
    source.insert(world_class());
    let mut first = source.get("net.example.World").unwrap();
    let second = source.get("net.example.World").unwrap();
    first.remove_field("grid").unwrap();
    assert!(second.field("grid").is_ok(), "units must not share state");
}
