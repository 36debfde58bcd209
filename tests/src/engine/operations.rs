use crate::support::{init_tracing, world_class, world_source};
use classpatch_core::code::CodeBody;
use classpatch_core::mappings::DefaultMappings;
use classpatch_core::opcode::Opcode;
use classpatch_core::unit::{ClassUnit, MemberKind, Modifiers};
use classpatch_document::model::OperationInvocation;
use classpatch_engine::dispatch::dispatch;
use classpatch_engine::ops::builtin_operations;
use classpatch_engine::registry::{OpContext, Registry};
use std::sync::Arc;

fn run(unit: ClassUnit, name: &str, body: &str, attrs: &[(&str, &str)]) -> ClassUnit {
    init_tracing();
    let registry = Registry::new(builtin_operations()).expect("builtin registry");
    let descriptor = registry.get(name).expect("builtin operation");
    let ctx = OpContext {
        source: Arc::new(world_source()),
        mappings: Arc::new(DefaultMappings),
    };
    let invocation = OperationInvocation {
        name: name.to_string(),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.to_string(),
    };
    dispatch(&ctx, descriptor, &invocation, unit)
}

fn member_by_name<'a>(unit: &'a ClassUnit, name: &str) -> &'a classpatch_core::unit::Member {
    unit.members()
        .iter()
        .find(|m| m.name == name)
        .expect("member present")
}

#[test]
fn insert_code_before_substitutes_the_field_attribute() {
    let unit = run(
        world_class(),
        "insertCodeBefore",
        "tick",
        &[("code", "check($field);"), ("field", "count")],
    );
    let fragments = member_by_name(&unit, "tick").code.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].source, "check(count);");
}

#[test]
fn disable_method_empties_the_body() {
    let unit = run(world_class(), "disableMethod", "tick", &[]);
    let code = &member_by_name(&unit, "tick").code;
    assert_eq!(code.bytes(), &[Opcode::RETURN.as_byte()]);
    assert!(code.fragments().is_empty());
}

#[test]
fn rename_and_remove_method() {
    let unit = run(world_class(), "renameMethod", "tick", &[("name", "tickOnce")]);
    assert!(unit.members().iter().any(|m| m.name == "tickOnce"));

    let unit = run(unit, "removeMethod", "tickOnce", &[]);
    assert!(!unit.members().iter().any(|m| m.name == "tickOnce"));
    assert!(unit.is_modified());
}

#[test]
fn add_field_skips_existing_and_adds_new() {
    let unit = run(
        world_class(),
        "addField",
        "",
        &[("field", "grid"), ("fieldClass", "game.Board")],
    );
    assert_eq!(unit.field("grid").unwrap().type_name, "game.Grid", "existing field wins");

    let unit = run(
        unit,
        "addField",
        "",
        &[("field", "cache"), ("fieldClass", "java.util.Map"), ("static", "true")],
    );
    let cache = unit.field("cache").unwrap();
    assert!(cache.modifiers.contains(Modifiers::STATIC));
    assert_eq!(cache.initializer.as_deref(), Some("new java.util.Map();"));
}

#[test]
fn volatile_flags_toggle_on_and_off() {
    let unit = run(world_class(), "setVolatile", "", &[("field", "count")]);
    assert!(unit.field("count").unwrap().modifiers.contains(Modifiers::VOLATILE));
    let unit = run(unit, "unsetVolatile", "", &[("field", "count")]);
    assert!(!unit.field("count").unwrap().modifiers.contains(Modifiers::VOLATILE));
}

#[test]
fn final_without_field_targets_primitive_fields_only() {
    let unit = run(world_class(), "final", "", &[]);
    assert!(unit.field("count").unwrap().modifiers.contains(Modifiers::FINAL));
    assert!(
        !unit.field("grid").unwrap().modifiers.contains(Modifiers::FINAL),
        "reference-typed fields are left alone"
    );
}

#[test]
fn remove_code_until_opcode_nops_the_prefix() {
    let mut unit = world_class();
    let member = unit
        .add_member(
            MemberKind::Method,
            "setup",
            Vec::new(),
            Some("void".to_string()),
            Modifiers::default(),
            // iconst_0, pop, iconst_1, pop, return
            CodeBody::new(vec![0x03, 0x57, 0x04, 0x57, 0xb1]),
        )
        .unwrap();
    let unit = run(unit, "removeCodeUntilOpcode", "setup", &[("opcode", "pop")]);
    let code = &unit.member(member).unwrap().code;
    assert_eq!(code.bytes(), &[0x00, 0x00, 0x00, 0x00, 0xb1]);
    assert!(code.stack_map_valid());
}

#[test]
fn replace_method_call_remove_after_truncates() {
    let mut unit = world_class();
    let tick_ref = unit.pool.add_method_ref("net.example.World", "tick", "()void");
    let count_field = unit.pool.add_field_ref("net.example.World", "count", "int");
    // aload_0, invokevirtual tick, aload_0, getfield count, pop, return
    let mut bytes = vec![0x2a, 0xb6];
    bytes.extend(tick_ref.to_be_bytes());
    bytes.push(0x2a);
    bytes.push(0xb4);
    bytes.extend(count_field.to_be_bytes());
    bytes.push(0x57);
    bytes.push(0xb1);
    let member = unit
        .add_member(
            MemberKind::Method,
            "cycle",
            Vec::new(),
            Some("void".to_string()),
            Modifiers::default(),
            CodeBody::new(bytes),
        )
        .unwrap();

    let unit = run(
        unit,
        "replaceMethodCall",
        "cycle",
        &[("method", "tick"), ("removeAfter", "true")],
    );
    let code = &unit.member(member).unwrap().code;
    // The call survives; everything after becomes padding plus a return.
    assert_eq!(code.bytes()[1], 0xb6);
    assert!(code.bytes()[4..9].iter().all(|&b| b == 0x00));
    assert_eq!(*code.bytes().last().unwrap(), Opcode::RETURN.as_byte());
}

#[test]
fn replace_field_access_rewrites_writes() {
    let unit = run(
        world_class(),
        "replaceFieldAccess",
        "update(int)",
        &[("field", "count"), ("writeCode", "{ this.store($1); }")],
    );
    let code = &member_by_name(&unit, "update").code;
    assert_eq!(code.fragments().len(), 1);
    assert_eq!(code.fragments()[0].source, "{ this.store($1); }");
    assert!(
        !code.bytes().contains(&0xb5),
        "the putfield must be gone from the stream"
    );
}

#[test]
fn lock_to_synchronized_rewrites_lock_calls() {
    let mut unit = world_class();
    let acquire = unit
        .pool
        .add_interface_method_ref("java.util.concurrent.locks.Lock", "lock", "()void");
    let release = unit
        .pool
        .add_interface_method_ref("java.util.concurrent.locks.Lock", "unlock", "()void");
    let mut bytes = vec![0xb9];
    bytes.extend(acquire.to_be_bytes());
    bytes.extend([0x01, 0x00]);
    bytes.push(0xb9);
    bytes.extend(release.to_be_bytes());
    bytes.extend([0x01, 0x00]);
    bytes.push(0xb1);
    unit.add_member(
        MemberKind::Method,
        "guarded",
        Vec::new(),
        Some("void".to_string()),
        Modifiers::default(),
        CodeBody::new(bytes),
    )
    .unwrap();

    let unit = run(unit, "lockToSynchronized", "guarded", &[]);
    let code = &member_by_name(&unit, "guarded").code;
    assert_eq!(code.bytes()[0], Opcode::MONITORENTER.as_byte());
    assert_eq!(code.bytes()[5], Opcode::MONITOREXIT.as_byte());
}

#[test]
fn set_synchronized_with_field_builds_a_wrapper() {
    let unit = run(world_class(), "setSynchronized", "tick", &[("field", "LOCK")]);
    assert!(unit.members().iter().any(|m| m.name == "tick_sync0"));
    let wrapper = member_by_name(&unit, "tick");
    assert_eq!(wrapper.code.fragments().len(), 1);
    assert!(wrapper.code.fragments()[0].source.contains("synchronized(LOCK)"));
}

#[test]
fn catch_and_ignore_appends_a_handler() {
    let unit = run(world_class(), "catchAndIgnoreExceptions", "tick", &[]);
    let code = &member_by_name(&unit, "tick").code;
    assert_eq!(code.handlers().len(), 1);
    assert_eq!(
        code.handlers()[0].catch_type.as_deref(),
        Some("java.lang.Throwable")
    );
}

#[test]
fn replace_new_expression_counts_sites() {
    let unit = run(
        world_class(),
        "replaceNewExpression",
        "",
        &[("oldClass", "game.Grid"), ("newClass", "game.FastGrid")],
    );
    let constructor = unit
        .members()
        .iter()
        .find(|m| m.kind == MemberKind::Constructor)
        .expect("constructor");
    assert_eq!(constructor.code.fragments().len(), 2);
    assert!(constructor.code.fragments()[0]
        .source
        .contains("new game.FastGrid()"));
}
