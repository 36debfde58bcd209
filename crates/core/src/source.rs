//! Class-model provider boundary.
//!
//! The engine never loads classes itself; it asks a [`ClassSource`] for an
//! editable [`ClassUnit`] and treats every provider failure as reportable,
//! never fatal. The in-memory implementation backs tests and embedders that
//! assemble units programmatically.

use crate::result::{Error, Result};
use crate::unit::ClassUnit;
use std::collections::HashMap;
use std::sync::Mutex;

/// Provides editable class units and the subtype relation the
/// field-initializer correlation needs.
pub trait ClassSource: Send + Sync {
    /// Fetches a fresh, unmodified unit for `name`.
    fn get(&self, name: &str) -> Result<ClassUnit>;

    /// Whether `ty` is `of` or a subtype of it. Implementations without
    /// hierarchy knowledge may fall back to name equality.
    fn is_subtype(&self, ty: &str, of: &str) -> bool {
        ty == of
    }
}

/// Class source over a fixed set of in-memory units with an explicit
/// supertype relation.
#[derive(Default)]
pub struct MemoryClassSource {
    classes: Mutex<HashMap<String, ClassUnit>>,
    supertypes: Mutex<HashMap<String, String>>,
}

impl MemoryClassSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit under its own name.
    pub fn insert(&self, unit: ClassUnit) {
        let mut classes = self.classes.lock().unwrap_or_else(|e| e.into_inner());
        classes.insert(unit.name().to_string(), unit);
    }

    /// Declares `sub`'s direct supertype.
    pub fn set_supertype(&self, sub: &str, sup: &str) {
        let mut supertypes = self.supertypes.lock().unwrap_or_else(|e| e.into_inner());
        supertypes.insert(sub.to_string(), sup.to_string());
    }
}

impl ClassSource for MemoryClassSource {
    fn get(&self, name: &str) -> Result<ClassUnit> {
        let classes = self.classes.lock().unwrap_or_else(|e| e.into_inner());
        let mut unit = classes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        unit.mark_clean();
        Ok(unit)
    }

    fn is_subtype(&self, ty: &str, of: &str) -> bool {
        if ty == of {
            return true;
        }
        let supertypes = self.supertypes.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = ty;
        while let Some(sup) = supertypes.get(current) {
            if sup == of {
                return true;
            }
            current = sup;
        }
        false
    }
}
