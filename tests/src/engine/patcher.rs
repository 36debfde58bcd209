use crate::support::{count_occurrences, init_tracing, world_class, world_source, CountingSource, ObfMappings};
use classpatch_core::source::MemoryClassSource;
use classpatch_engine::patcher::{Patcher, PatcherConfig};
use std::sync::Arc;

const SIMPLE_DOC: &str = r#"<patches><fixes>
  <patch id="net.example.World">
    <insertCodeBefore code="GUARD();">tick</insertCodeBefore>
  </patch>
</fixes></patches>"#;

fn simple_patcher() -> Patcher {
    init_tracing();
    let patcher =
        Patcher::new(PatcherConfig::new(Arc::new(world_source()))).expect("construct patcher");
    patcher.load_document(SIMPLE_DOC).expect("load document");
    patcher
}

#[test]
fn classes_without_entries_pass_through_unchanged() {
    let patcher = simple_patcher();
    assert!(!patcher.will_patch("net.example.Elsewhere"));
    let bytes = patcher.patch("net.example.Elsewhere", b"untouched");
    assert_eq!(bytes, b"untouched".to_vec());
}

#[test]
fn patching_twice_is_memoized_and_computes_once() {
    init_tracing();
    let source = CountingSource::new(world_source());
    let config = PatcherConfig::new(source.clone());
    let patcher = Patcher::new(config).expect("construct patcher");
    patcher.load_document(SIMPLE_DOC).expect("load document");

    let first = patcher.patch("net.example.World", b"original");
    let second = patcher.patch("net.example.World", b"original");
    assert_eq!(first, second, "memoized result must be byte-identical");
    assert_ne!(first, b"original".to_vec());
    assert_eq!(source.get_count(), 1, "the provider runs at most once per class");
}

#[test]
fn compute_failures_fall_back_to_the_original_bytes() {
    init_tracing();
    // The document names a class the provider cannot supply.
    let patcher =
        Patcher::new(PatcherConfig::new(Arc::new(MemoryClassSource::new()))).expect("construct");
    patcher.load_document(SIMPLE_DOC).expect("load document");
    assert!(patcher.will_patch("net.example.World"));
    let bytes = patcher.patch("net.example.World", b"original");
    assert_eq!(bytes, b"original".to_vec(), "failures must never surface");
}

#[test]
fn duplicate_class_in_one_group_fails_the_load() {
    init_tracing();
    let patcher =
        Patcher::new(PatcherConfig::new(Arc::new(world_source()))).expect("construct patcher");
    let err = patcher
        .load_document(
            r#"<patches><fixes>
                 <patch id="net.example.World"><disableMethod>tick</disableMethod></patch>
                 <patch id="net.example.World"><disableMethod>update(int)</disableMethod></patch>
               </fixes></patches>"#,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        classpatch_engine::Error::DuplicateClass { .. }
    ));
}

#[test]
fn duplicate_class_across_groups_keeps_the_first_registration() {
    let patcher = simple_patcher();
    patcher
        .load_document(
            r#"<patches><later>
                 <patch id="net.example.World">
                   <insertCodeBefore code="SECOND();">tick</insertCodeBefore>
                 </patch>
               </later></patches>"#,
        )
        .expect("cross-group duplicates are not fatal");
    let patched = patcher.patch("net.example.World", b"original");
    assert_eq!(count_occurrences(&patched, "GUARD();"), 1);
    assert_eq!(count_occurrences(&patched, "SECOND();"), 0);
}

#[test]
fn eager_groups_patch_every_class_on_first_request() {
    init_tracing();
    let source = MemoryClassSource::new();
    let mut first = world_class();
    first.set_name("a.First");
    source.insert(first);
    let mut second = world_class();
    second.set_name("a.Second");
    source.insert(second);
    let counting = CountingSource::new(source);

    let patcher = Patcher::new(PatcherConfig::new(counting.clone())).expect("construct");
    patcher
        .load_document(
            r#"<patches><boot onDemand="false">
                 <patch id="a.First"><insertCodeBefore code="ONE();">tick</insertCodeBefore></patch>
                 <patch id="a.Second"><insertCodeBefore code="TWO();">tick</insertCodeBefore></patch>
               </boot></patches>"#,
        )
        .expect("load document");

    // Requesting the first class computes the whole group.
    let first = patcher.patch("a.First", b"orig-first");
    assert_ne!(first, b"orig-first".to_vec());
    assert_eq!(counting.get_count(), 2, "mutual triggering computes the sibling too");

    let second = patcher.patch("a.Second", b"orig-second");
    assert_eq!(count_occurrences(&second, "TWO();"), 1);
    assert_eq!(counting.get_count(), 2, "the sibling was already computed");
}

#[test]
fn eager_classes_never_modified_are_not_cached() {
    init_tracing();
    let patcher =
        Patcher::new(PatcherConfig::new(Arc::new(world_source()))).expect("construct patcher");
    // The only operation targets a method that does not exist, silently.
    patcher
        .load_document(
            r#"<patches><boot onDemand="false">
                 <patch id="net.example.World">
                   <insertCodeBefore code="NEVER();" allowMissing="true">absent</insertCodeBefore>
                 </patch>
               </boot></patches>"#,
        )
        .expect("load document");
    let bytes = patcher.patch("net.example.World", b"original");
    assert_eq!(bytes, b"original".to_vec(), "no byte-level change, no cached output");
    let again = patcher.patch("net.example.World", b"original");
    assert_eq!(again, b"original".to_vec());
}

#[test]
fn require_property_consults_the_configured_lookup() {
    init_tracing();
    let mut config = PatcherConfig::new(Arc::new(world_source()));
    config.properties = Box::new(|name| name == "patcher.enable");
    let patcher = Patcher::new(config).expect("construct patcher");
    patcher
        .load_document(
            r#"<patches>
                 <on requireProperty="patcher.enable">
                   <patch id="net.example.World"><disableMethod>tick</disableMethod></patch>
                 </on>
                 <off requireProperty="patcher.other">
                   <patch id="net.example.Other"><disableMethod>tick</disableMethod></patch>
                 </off>
               </patches>"#,
        )
        .expect("load document");
    assert!(patcher.will_patch("net.example.World"));
    assert!(!patcher.will_patch("net.example.Other"));
}

#[test]
fn debug_dump_writes_class_files_under_the_configured_directory() {
    init_tracing();
    let dir = std::env::temp_dir().join(format!(
        "classpatch-dump-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    let mut config = PatcherConfig::new(Arc::new(world_source()));
    config.debug_dir = Some(dir.clone());
    let patcher = Patcher::new(config).expect("construct patcher");
    patcher.load_document(SIMPLE_DOC).expect("load document");
    let patched = patcher.patch("net.example.World", b"original");

    let dumped = dir.join("net").join("example").join("World.class");
    let on_disk = std::fs::read(&dumped).expect("dump file written");
    assert_eq!(on_disk, patched);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn mapped_documents_patch_target_namespace_classes() {
    init_tracing();
    let source = MemoryClassSource::new();
    let mut unit = world_class();
    unit.set_name("ob.net.example.World");
    for id in unit.declared_methods() {
        let renamed = format!("m_{}", unit.member(id).unwrap().name);
        unit.member_mut(id).unwrap().set_name(&renamed);
    }
    source.insert(unit);

    let mut config = PatcherConfig::new(Arc::new(source));
    config.mappings = Arc::new(ObfMappings);
    let patcher = Patcher::new(config).expect("construct patcher");
    patcher.load_document(SIMPLE_DOC).expect("load document");

    assert!(patcher.will_patch("ob.net.example.World"));
    assert!(!patcher.will_patch("net.example.World"));
    let patched = patcher.patch("ob.net.example.World", b"original");
    assert_eq!(count_occurrences(&patched, "GUARD();"), 1);
}
