use crate::support::{init_tracing, world_class, world_source};
use classpatch_core::source::MemoryClassSource;
use classpatch_engine::patcher::{Patcher, PatcherConfig};
use std::sync::Arc;

fn patcher_with(source: MemoryClassSource, document: &str) -> Patcher {
    init_tracing();
    let patcher = Patcher::new(PatcherConfig::new(Arc::new(source))).expect("construct patcher");
    patcher.load_document(document).expect("load document");
    patcher
}

#[test]
fn multi_id_expansion_yields_independent_entries() {
    let source = MemoryClassSource::new();
    let mut first = world_class();
    first.set_name("a.First");
    source.insert(first);
    let mut second = world_class();
    second.set_name("a.Second");
    source.insert(second);

    let patcher = patcher_with(
        source,
        r#"<patches><fixes>
             <patch id="a.First  a.Second">
               <insertCodeBefore code="GUARD();">tick</insertCodeBefore>
             </patch>
           </fixes></patches>"#,
    );
    assert!(patcher.will_patch("a.First"));
    assert!(patcher.will_patch("a.Second"));

    let first = patcher.patch("a.First", b"orig-first");
    let second = patcher.patch("a.Second", b"orig-second");
    assert_ne!(first, b"orig-first".to_vec());
    assert_ne!(second, b"orig-second".to_vec());
    assert_eq!(crate::support::count_occurrences(&first, "GUARD();"), 1);
    assert_eq!(crate::support::count_occurrences(&second, "GUARD();"), 1);
}

#[test]
fn json_documents_load_like_native_ones() {
    let patcher = patcher_with(
        world_source(),
        r#"{ "patches": { "fixes": {
             "net.example.World": { "id": "net.example.World",
               "insertCodeBefore": { "code": "GUARD();", "target": "tick update(int)" } } } } }"#,
    );
    assert!(patcher.will_patch("net.example.World"));
    let patched = patcher.patch("net.example.World", b"original");
    assert_eq!(
        crate::support::count_occurrences(&patched, "GUARD();"),
        2,
        "both listed methods must receive the fragment"
    );
}

#[test]
fn unknown_document_formats_are_fatal() {
    init_tracing();
    let patcher =
        Patcher::new(PatcherConfig::new(Arc::new(world_source()))).expect("construct patcher");
    assert!(patcher.load_document("yaml: nope").is_err());
    assert!(patcher.load_document("").is_err());
}
