//! Shared fixtures: a deterministic fake mapping, a call-counting class
//! source and bytecode builders for realistic class units.

use classpatch_core::code::CodeBody;
use classpatch_core::ident::{ClassId, FieldId, MethodId};
use classpatch_core::mappings::Mappings;
use classpatch_core::source::{ClassSource, MemoryClassSource};
use classpatch_core::result::Result;
use classpatch_core::unit::{ClassUnit, FieldDecl, MemberKind, Modifiers};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_test_writer()
        .try_init();
}

/// Deterministic fake mapping: classes gain an `ob.` prefix, method names an
/// `m_` prefix. `unmap_method` inverts `map_method` exactly.
pub struct ObfMappings;

impl Mappings for ObfMappings {
    fn map_class(&self, class: &ClassId) -> Option<ClassId> {
        Some(ClassId::new(format!("ob.{}", class.name)))
    }

    fn map_method(&self, method: &MethodId) -> Option<MethodId> {
        let mut mapped = method.clone();
        mapped.class = format!("ob.{}", method.class);
        mapped.name = format!("m_{}", method.name);
        Some(mapped)
    }

    fn map_field(&self, field: &FieldId) -> Option<FieldId> {
        Some(FieldId::new(
            field.class.clone(),
            format!("f_{}", field.name),
        ))
    }

    fn unmap_method(&self, method: &MethodId) -> Option<MethodId> {
        let mut unmapped = method.clone();
        unmapped.class = method.class.strip_prefix("ob.")?.to_string();
        unmapped.name = method.name.strip_prefix("m_")?.to_string();
        Some(unmapped)
    }

    fn obfuscate(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Counts provider fetches so tests can observe the at-most-once compute
/// guarantee.
pub struct CountingSource {
    inner: MemoryClassSource,
    gets: AtomicUsize,
}

impl CountingSource {
    pub fn new(inner: MemoryClassSource) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gets: AtomicUsize::new(0),
        })
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl ClassSource for CountingSource {
    fn get(&self, name: &str) -> Result<ClassUnit> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(name)
    }

    fn is_subtype(&self, ty: &str, of: &str) -> bool {
        self.inner.is_subtype(ty, of)
    }
}

/// Builds the canonical fixture class `net.example.World`:
///
/// - field `grid` of type `game.Grid`, field `count` of type `int`
/// - a constructor that initializes `grid` twice with an unrelated call in
///   between (the double-initializer correlation scenario)
/// - methods `tick()` and `update(int)`
/// - a static initializer
pub fn world_class() -> ClassUnit {
    let mut unit = ClassUnit::new("net.example.World", Some("java.lang.Object"));
    unit.add_field(FieldDecl {
        name: "grid".to_string(),
        type_name: "game.Grid".to_string(),
        modifiers: Modifiers::default(),
        initializer: None,
    });
    unit.add_field(FieldDecl {
        name: "count".to_string(),
        type_name: "int".to_string(),
        modifiers: Modifiers::default(),
        initializer: None,
    });

    let grid_class = unit.pool.add_class("game.Grid");
    let grid_init = unit.pool.add_method_ref("game.Grid", "<init>", "()void");
    let grid_field = unit
        .pool
        .add_field_ref("net.example.World", "grid", "game.Grid");
    let count_field = unit.pool.add_field_ref("net.example.World", "count", "int");
    let tick_ref = unit
        .pool
        .add_method_ref("net.example.World", "tick", "()void");

    // { this.grid = new game.Grid(); tick(); this.grid = new game.Grid(); }
    let mut constructor = Vec::new();
    let mut init_pair = |constructor: &mut Vec<u8>| {
        constructor.push(0x2a); // aload_0
        constructor.push(0xbb); // new game.Grid
        constructor.extend(grid_class.to_be_bytes());
        constructor.push(0x59); // dup
        constructor.push(0xb7); // invokespecial game.Grid.<init>
        constructor.extend(grid_init.to_be_bytes());
        constructor.push(0xb5); // putfield grid
        constructor.extend(grid_field.to_be_bytes());
    };
    init_pair(&mut constructor);
    constructor.push(0x2a); // aload_0
    constructor.push(0xb6); // invokevirtual tick()  (between the pairs)
    constructor.extend(tick_ref.to_be_bytes());
    init_pair(&mut constructor);
    constructor.push(0xb1); // return

    unit.add_member(
        MemberKind::Constructor,
        "<init>",
        Vec::new(),
        None,
        Modifiers::default().as_public(),
        CodeBody::new(constructor),
    )
    .expect("add constructor");

    let mut tick = Vec::new();
    tick.push(0x2a); // aload_0
    tick.push(0xb4); // getfield count
    tick.extend(count_field.to_be_bytes());
    tick.push(0x57); // pop
    tick.push(0xb1); // return
    unit.add_member(
        MemberKind::Method,
        "tick",
        Vec::new(),
        Some("void".to_string()),
        Modifiers::default().as_public(),
        CodeBody::new(tick),
    )
    .expect("add tick");

    let mut update = Vec::new();
    update.push(0x2a); // aload_0
    update.push(0x1b); // iload_1
    update.push(0xb5); // putfield count
    update.extend(count_field.to_be_bytes());
    update.push(0xb1); // return
    unit.add_member(
        MemberKind::Method,
        "update",
        vec!["int".to_string()],
        Some("void".to_string()),
        Modifiers::default().as_public(),
        CodeBody::new(update),
    )
    .expect("add update");

    unit.add_member(
        MemberKind::StaticInit,
        "<clinit>",
        Vec::new(),
        None,
        Modifiers::default().with(Modifiers::STATIC),
        CodeBody::new(vec![0xb1]),
    )
    .expect("add static initializer");

    unit
}

/// A fresh in-memory source holding [`world_class`].
pub fn world_source() -> MemoryClassSource {
    let source = MemoryClassSource::new();
    source.insert(world_class());
    source
}

/// Occurrences of `needle` in the serialized unit; fragments carry their
/// source text verbatim, so this observes applied replacements.
pub fn count_occurrences(bytes: &[u8], needle: &str) -> usize {
    let needle = needle.as_bytes();
    if needle.is_empty() || bytes.len() < needle.len() {
        return 0;
    }
    (0..=bytes.len() - needle.len())
        .filter(|&i| &bytes[i..i + needle.len()] == needle)
        .count()
}
