//! The patch group executor: document loading, caching and the public
//! patch surface.
//!
//! A [`Patcher`] owns the operation registry, the class source and the
//! identifier mapping, compiles loaded documents into per-class entries, and
//! serves `patch(class, bytes)` requests from a write-once cache. The whole
//! patch-retrieval path, cache lookup and compute-on-miss alike, runs inside one
//! mutex, trading parallelism for an at-most-once-compute-per-class
//! guarantee and for the safety of eager groups, which fill many cache
//! entries in one pass.

use crate::dispatch::dispatch;
use crate::ops::builtin_operations;
use crate::registry::{OpContext, OperationDescriptor, Registry};
use crate::{Error, Result};
use classpatch_core::mappings::{DefaultMappings, Mappings};
use classpatch_core::source::ClassSource;
use classpatch_document::model::{self, ClassPatchEntry, PatchGroup};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Resolves `requireProperty` gates at document load.
pub type PropertyLookup = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Environment variable naming the directory for best-effort byte dumps of
/// every successfully patched class.
pub const DEBUG_DIR_VAR: &str = "CLASSPATCH_DEBUG";

/// Engine construction parameters.
pub struct PatcherConfig {
    /// Class-model provider.
    pub source: Arc<dyn ClassSource>,
    /// Identifier mapping; defaults to the no-op mapping.
    pub mappings: Arc<dyn Mappings>,
    /// Operation descriptors to register; defaults to the builtin set.
    pub operations: Vec<OperationDescriptor>,
    /// Property lookup for `requireProperty` gating; defaults to reading the
    /// process environment and treating the literal value `true` as set.
    pub properties: PropertyLookup,
    /// Debug dump directory; defaults to the `CLASSPATCH_DEBUG` environment
    /// variable when non-empty.
    pub debug_dir: Option<PathBuf>,
}

impl PatcherConfig {
    pub fn new(source: Arc<dyn ClassSource>) -> Self {
        Self {
            source,
            mappings: Arc::new(DefaultMappings),
            operations: builtin_operations(),
            properties: Box::new(|name| {
                std::env::var(name).map(|value| value == "true").unwrap_or(false)
            }),
            debug_dir: std::env::var(DEBUG_DIR_VAR)
                .ok()
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        }
    }
}

#[derive(Copy, Clone)]
struct EntryKey {
    group: usize,
    entry: usize,
}

/// One compiled group. `applied` only ever flips for eager groups, whose
/// classes are all computed on the first request to any of them.
struct GroupState {
    group: PatchGroup,
    applied: bool,
}

#[derive(Default)]
struct PatcherState {
    groups: Vec<GroupState>,
    index: HashMap<String, EntryKey>,
    cache: HashMap<String, Vec<u8>>,
}

/// The engine: registry, collaborators and serialized mutable state.
pub struct Patcher {
    registry: Registry,
    ctx: OpContext,
    properties: PropertyLookup,
    debug_dir: Option<PathBuf>,
    state: Mutex<PatcherState>,
}

impl Patcher {
    /// Builds the engine; fails on duplicate operation registration.
    pub fn new(config: PatcherConfig) -> Result<Self> {
        let registry = Registry::new(config.operations)?;
        debug!(operations = registry.len(), "constructed patcher");
        Ok(Self {
            registry,
            ctx: OpContext {
                source: config.source,
                mappings: config.mappings,
            },
            properties: config.properties,
            debug_dir: config.debug_dir,
            state: Mutex::new(PatcherState::default()),
        })
    }

    /// The identifier mapping shared by every document load.
    pub fn mappings(&self) -> Arc<dyn Mappings> {
        Arc::clone(&self.ctx.mappings)
    }

    /// Loads and compiles one patch document.
    ///
    /// A class id claimed twice within one group is a fatal load error. A
    /// class already claimed by another group keeps its first registration;
    /// the conflict is logged as an error.
    pub fn load_document(&self, text: &str) -> Result<()> {
        let root = model::parse_document(text)?;
        let groups = model::load_groups(root, self.ctx.mappings.as_ref(), &|name| {
            (self.properties)(name)
        })?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let base = state.groups.len();
        let mut staged = Vec::new();
        let mut staged_index: Vec<(String, EntryKey)> = Vec::new();
        for (offset, mut group) in groups.into_iter().enumerate() {
            let mut seen = HashSet::new();
            let mut kept = Vec::new();
            for entry in group.entries.drain(..) {
                let name = entry.class.name.clone();
                if !seen.insert(name.clone()) {
                    return Err(Error::DuplicateClass {
                        class: name,
                        group: group.name.clone(),
                    });
                }
                let claimed = state.index.contains_key(&name)
                    || staged_index.iter().any(|(staged_name, _)| *staged_name == name);
                if claimed {
                    error!(
                        class = %name,
                        group = %group.name,
                        "class already claimed by another patch group"
                    );
                    continue;
                }
                staged_index.push((
                    name,
                    EntryKey {
                        group: base + offset,
                        entry: kept.len(),
                    },
                ));
                kept.push(entry);
            }
            group.entries = kept;
            staged.push(GroupState {
                group,
                applied: false,
            });
        }
        for (name, key) in staged_index {
            state.index.insert(name, key);
        }
        state.groups.extend(staged);
        Ok(())
    }

    /// Whether a patch entry exists for the class.
    pub fn will_patch(&self, class_name: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.index.contains_key(class_name)
    }

    /// Patches the named class, returning `original` unchanged when no entry
    /// exists or anything fails. Globally serialized; never panics across
    /// this boundary.
    pub fn patch(&self, class_name: &str, original: &[u8]) -> Vec<u8> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bytes) = state.cache.get(class_name) {
            return bytes.clone();
        }
        let Some(key) = state.index.get(class_name).copied() else {
            return original.to_vec();
        };
        let (group_name, on_demand, applied) = {
            let group = &state.groups[key.group];
            (group.group.name.clone(), group.group.on_demand, group.applied)
        };

        if on_demand {
            let entry = state.groups[key.group].group.entries[key.entry].clone();
            match self.compute(&entry) {
                Ok((bytes, _)) => {
                    state.cache.insert(class_name.to_string(), bytes.clone());
                    self.dump_debug(class_name, &bytes);
                    bytes
                }
                Err(e) => {
                    error!(
                        class = class_name,
                        group = %group_name,
                        error = %e,
                        "failed to patch"
                    );
                    original.to_vec()
                }
            }
        } else {
            if applied {
                // The group already ran and produced nothing for this class.
                return original.to_vec();
            }
            state.groups[key.group].applied = true;
            let entries = state.groups[key.group].group.entries.clone();
            for entry in &entries {
                match self.compute(entry) {
                    Ok((bytes, modified)) => {
                        if modified {
                            self.dump_debug(&entry.class.name, &bytes);
                            state.cache.insert(entry.class.name.clone(), bytes);
                        } else {
                            // No byte-level change, so produced bytecode would
                            // be meaningless, keep the loader's original.
                            warn!(
                                class = %entry.class.name,
                                group = %group_name,
                                "class was never modified by its operations, not caching"
                            );
                        }
                    }
                    Err(e) => error!(
                        class = %entry.class.name,
                        group = %group_name,
                        error = %e,
                        "failed to patch"
                    ),
                }
            }
            state
                .cache
                .get(class_name)
                .cloned()
                .unwrap_or_else(|| original.to_vec())
        }
    }

    /// Runs one entry's operations in document order against a fresh unit.
    fn compute(&self, entry: &ClassPatchEntry) -> Result<(Vec<u8>, bool)> {
        let mut unit = self.ctx.source.get(&entry.class.name)?;
        unit.mark_clean();
        for invocation in &entry.operations {
            let Some(descriptor) = self.registry.get(&invocation.name) else {
                error!(
                    class = %entry.class.name,
                    operation = %invocation.name,
                    "couldn't find patch operation"
                );
                continue;
            };
            unit = dispatch(&self.ctx, descriptor, invocation, unit);
        }
        let modified = unit.is_modified();
        Ok((unit.serialize(), modified))
    }

    /// Writes a summary of every compiled entry to the info log.
    pub fn log_debug_info(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        info!(classes = state.index.len(), "logging patcher debug info");
        for group in &state.groups {
            for entry in &group.group.entries {
                let operations: Vec<&str> =
                    entry.operations.iter().map(|o| o.name.as_str()).collect();
                info!(
                    group = %group.group.name,
                    class = %entry.class.name,
                    canonical = %entry.canonical.name,
                    ?operations,
                    "class patch"
                );
            }
        }
    }

    /// Best-effort byte dump under the debug directory; dots in the class
    /// name become path separators.
    fn dump_debug(&self, class_name: &str, bytes: &[u8]) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let mut path = dir.clone();
        for part in class_name.split('.') {
            path.push(part);
        }
        path.set_extension("class");
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(path = %path.display(), error = %e, "failed to create debug directory");
                return;
            }
        }
        if let Err(e) = std::fs::write(&path, bytes) {
            error!(path = %path.display(), error = %e, "failed to save patched bytes");
        }
    }
}
