use crate::support::{init_tracing, world_class, world_source};
use classpatch_core::mappings::DefaultMappings;
use classpatch_core::unit::ClassUnit;
use classpatch_document::model::OperationInvocation;
use classpatch_engine::dispatch::dispatch;
use classpatch_engine::registry::{OpContext, OperationDescriptor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Seen = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

/// A member-level probe that records each selected member and the effective
/// attributes it was invoked with.
fn probe(seen: Seen) -> OperationDescriptor {
    OperationDescriptor::member("probe", Some(&[]), move |_, class, id, attrs| {
        let name = class.member(id)?.signature_string();
        seen.lock().unwrap().push((name, attrs.clone()));
        Ok(())
    })
}

fn ctx() -> OpContext {
    init_tracing();
    OpContext {
        source: Arc::new(world_source()),
        mappings: Arc::new(DefaultMappings),
    }
}

fn invocation(name: &str, body: &str, attrs: &[(&str, &str)]) -> OperationInvocation {
    OperationInvocation {
        name: name.to_string(),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.to_string(),
    }
}

#[test]
fn all_sentinel_selects_every_member_and_forces_silent() {
    let seen: Seen = Arc::default();
    let descriptor = probe(seen.clone());
    // 2 methods + 1 constructor + the static initializer.
    dispatch(&ctx(), &descriptor, &invocation("probe", "^all^", &[]), world_class());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4, "2 methods + 1 constructor + <clinit>");
    for (member, attrs) in seen.iter() {
        assert_eq!(
            attrs.get("silent").map(String::as_str),
            Some("true"),
            "{member} must carry a forced silent attribute"
        );
    }
}

#[test]
fn static_sentinel_without_initializer_is_not_fatal() {
    let seen: Seen = Arc::default();
    let descriptor = probe(seen.clone());
    let bare = ClassUnit::new("a.Bare", None);
    dispatch(&ctx(), &descriptor, &invocation("probe", "^static^", &[]), bare);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn empty_body_selects_constructors_for_member_operations() {
    let seen: Seen = Arc::default();
    let descriptor = probe(seen.clone());
    dispatch(&ctx(), &descriptor, &invocation("probe", "", &[]), world_class());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "<init>()");
}

#[test]
fn unresolvable_references_skip_but_never_abort_the_list() {
    let seen: Seen = Arc::default();
    let descriptor = probe(seen.clone());
    dispatch(
        &ctx(),
        &descriptor,
        &invocation("probe", "missing tick nonexistent(int) update(int)", &[]),
        world_class(),
    );
    let names: Vec<String> = seen.lock().unwrap().iter().map(|(m, _)| m.clone()).collect();
    assert_eq!(names, ["tick()", "update(int)"]);
}

#[test]
fn missing_required_attributes_skip_the_invocation() {
    let seen: Seen = Arc::default();
    let descriptor = OperationDescriptor::member("needs", Some(&["code"]), {
        let seen = seen.clone();
        move |_, class, id, attrs| {
            let name = class.member(id)?.signature_string();
            seen.lock().unwrap().push((name, attrs.clone()));
            Ok(())
        }
    });
    dispatch(&ctx(), &descriptor, &invocation("needs", "tick", &[]), world_class());
    assert!(seen.lock().unwrap().is_empty(), "invocation must be skipped");
}

#[test]
fn one_failing_member_does_not_stop_its_siblings() {
    let seen: Seen = Arc::default();
    let descriptor = OperationDescriptor::member("flaky", Some(&[]), {
        let seen = seen.clone();
        move |_, class, id, attrs| {
            let name = class.member(id)?.signature_string();
            seen.lock().unwrap().push((name.clone(), attrs.clone()));
            if name == "tick()" {
                return Err(classpatch_engine::Error::InvalidAttribute {
                    op: "flaky",
                    msg: "boom".to_string(),
                });
            }
            Ok(())
        }
    });
    dispatch(
        &ctx(),
        &descriptor,
        &invocation("flaky", "tick update(int)", &[]),
        world_class(),
    );
    assert_eq!(seen.lock().unwrap().len(), 2, "both members must run");
}

#[test]
fn class_level_results_replace_the_threaded_unit() {
    let descriptor = OperationDescriptor::class("swap", Some(&[]), |_, _, _| {
        Ok(Some(ClassUnit::new("a.Replacement", None)))
    });
    let result = dispatch(&ctx(), &descriptor, &invocation("swap", "", &[]), world_class());
    assert_eq!(result.name(), "a.Replacement");
}
