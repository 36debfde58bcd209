use crate::support::ObfMappings;
use classpatch_core::ident::MethodId;
use classpatch_core::mappings::Mappings;

#[test]
fn mapping_round_trip_recovers_the_canonical_identifier() {
    let mappings = ObfMappings;
    let originals = [
        MethodId::erased("net.example.World", "tick"),
        MethodId::parse("net.example.World", "update(int,game.Grid)void").unwrap(),
        MethodId::parse("game.Grid", "resize(int)").unwrap(),
    ];
    for original in originals {
        let mapped = mappings.map_method(&original).expect("mapping defined");
        assert_ne!(mapped, original, "fake mapping must actually rename");
        let recovered = mappings.unmap_method(&mapped).expect("unmapping defined");
        assert_eq!(recovered, original, "unmap(map(x)) must recover x");
    }
}

#[test]
fn unmap_rejects_names_outside_the_target_namespace() {
    let mappings = ObfMappings;
    let stranger = MethodId::erased("net.example.World", "tick");
    assert!(mappings.unmap_method(&stranger).is_none());
}
