//! Mutable code buffers: raw instruction bytes, exception table, injected
//! fragments and the index-sensitive stack map.
//!
//! The buffer is deliberately byte-oriented. Patch operations that only need
//! expression-level edits go through the fragment primitives; the
//! instruction-stream algorithms read and overwrite bytes directly, exactly
//! like the class file they stand in for. Compiling fragment source into
//! real bytecode is the class-model provider's concern; the buffer records
//! placement so serialization and tests observe every edit.

use crate::opcode::Opcode;
use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};

/// Single decoded instruction with its byte offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode.
    pub pc: usize,
    /// Parsed opcode.
    pub op: Opcode,
}

impl Instruction {
    /// Total byte size including operands.
    #[inline]
    pub fn byte_size(&self) -> usize {
        1 + self.op.operand_len()
    }

    /// Offset of the following instruction.
    #[inline]
    pub fn next_pc(&self) -> usize {
        self.pc + self.byte_size()
    }
}

/// One exception table row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// First covered offset.
    pub start_pc: usize,
    /// Exclusive end of the covered range.
    pub end_pc: usize,
    /// Offset where handling begins.
    pub handler_pc: usize,
    /// Caught type, `None` for catch-all.
    pub catch_type: Option<String>,
}

/// Where an injected fragment sits relative to the member's code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentKind {
    /// Runs before the first instruction.
    Entry,
    /// Runs at every exit; `finally` also covers abrupt completion.
    Exit { finally: bool },
    /// Replaces the instruction bytes in `[start, end)`.
    Replace { start: usize, end: usize },
    /// The whole body, after `set_body`.
    Body,
    /// Handler body for an appended catch-all row.
    Handler,
}

/// A code fragment recorded against the member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    /// Fragment source text, opaque to the engine.
    pub source: String,
}

/// Mutable code attribute of one member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBody {
    bytes: Vec<u8>,
    handlers: Vec<ExceptionHandler>,
    fragments: Vec<Fragment>,
    stack_map: Vec<usize>,
    stack_map_valid: bool,
    mutated: bool,
}

impl CodeBody {
    /// Wraps raw instruction bytes and derives the initial stack map.
    pub fn new(bytes: Vec<u8>) -> Self {
        let mut body = Self {
            bytes,
            handlers: Vec::new(),
            fragments: Vec::new(),
            stack_map: Vec::new(),
            stack_map_valid: false,
            mutated: false,
        };
        // Initial stack map; ignore decode problems until someone reads it.
        let _ = body.rebuild_stack_map();
        body.mutated = false;
        body
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Offsets recorded by the last stack-map rebuild.
    pub fn stack_map(&self) -> &[usize] {
        &self.stack_map
    }

    /// False whenever bytes changed after the last rebuild.
    pub fn stack_map_valid(&self) -> bool {
        self.stack_map_valid
    }

    /// True once any byte, fragment or handler edit happened.
    pub fn is_mutated(&self) -> bool {
        self.mutated
    }

    /// Decodes the full buffer into instructions.
    pub fn decode(&self) -> Result<Vec<Instruction>> {
        let mut instructions = Vec::new();
        let mut pc = 0;
        while pc < self.bytes.len() {
            let op = Opcode::from_byte(self.bytes[pc]);
            let size = 1 + op.operand_len();
            if pc + size > self.bytes.len() {
                return Err(Error::TruncatedInstruction { pc });
            }
            instructions.push(Instruction { pc, op });
            pc += size;
        }
        Ok(instructions)
    }

    /// Reads one byte.
    pub fn byte_at(&self, pc: usize) -> Result<u8> {
        self.bytes.get(pc).copied().ok_or(Error::CodeOutOfBounds {
            pc,
            len: self.bytes.len(),
        })
    }

    /// Overwrites one byte and invalidates the stack map.
    pub fn write_byte(&mut self, pc: usize, byte: u8) -> Result<()> {
        let len = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(pc)
            .ok_or(Error::CodeOutOfBounds { pc, len })?;
        *slot = byte;
        self.stack_map_valid = false;
        self.mutated = true;
        Ok(())
    }

    /// Reads a big-endian u16 operand.
    pub fn u16_at(&self, pc: usize) -> Result<u16> {
        let high = self.byte_at(pc)?;
        let low = self.byte_at(pc + 1)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Writes a big-endian u16 operand.
    pub fn write_u16(&mut self, pc: usize, value: u16) -> Result<()> {
        let [high, low] = value.to_be_bytes();
        self.write_byte(pc, high)?;
        self.write_byte(pc + 1, low)
    }

    /// Records an entry fragment.
    pub fn insert_before(&mut self, source: &str) {
        self.push_fragment(FragmentKind::Entry, source);
    }

    /// Records an exit fragment.
    pub fn insert_after(&mut self, source: &str, finally: bool) {
        self.push_fragment(FragmentKind::Exit { finally }, source);
    }

    /// NOPs out `[start, end)` and records the replacement fragment.
    pub fn replace_span(&mut self, start: usize, end: usize, source: &str) -> Result<()> {
        if end > self.bytes.len() || start > end {
            return Err(Error::CodeOutOfBounds {
                pc: end,
                len: self.bytes.len(),
            });
        }
        for pc in start..end {
            self.bytes[pc] = Opcode::NOP.as_byte();
        }
        self.stack_map_valid = false;
        self.push_fragment(FragmentKind::Replace { start, end }, source);
        Ok(())
    }

    /// Discards the existing body for a bare return, optionally recording a
    /// full replacement fragment.
    pub fn set_body(&mut self, source: Option<&str>) {
        self.bytes = vec![Opcode::RETURN.as_byte()];
        self.handlers.clear();
        self.fragments.clear();
        self.stack_map_valid = false;
        self.mutated = true;
        if let Some(source) = source {
            self.push_fragment(FragmentKind::Body, source);
        }
        let _ = self.rebuild_stack_map();
    }

    /// Replaces this body with another member's code wholesale.
    pub fn copy_from(&mut self, other: &CodeBody) {
        self.bytes = other.bytes.clone();
        self.handlers = other.handlers.clone();
        self.fragments = other.fragments.clone();
        self.stack_map_valid = false;
        self.mutated = true;
    }

    /// Appends a handler row covering the whole body plus its fragment.
    pub fn add_handler(&mut self, catch_type: Option<&str>, source: &str) {
        self.handlers.push(ExceptionHandler {
            start_pc: 0,
            end_pc: self.bytes.len(),
            handler_pc: self.bytes.len(),
            catch_type: catch_type.map(str::to_string),
        });
        self.push_fragment(FragmentKind::Handler, source);
    }

    /// Re-derives the stack map from the current bytes.
    ///
    /// The map records every instruction-start offset, which is exactly the
    /// index-sensitive metadata that goes stale after any byte-level edit.
    pub fn rebuild_stack_map(&mut self) -> Result<()> {
        let instructions = self.decode()?;
        self.stack_map = instructions.iter().map(|i| i.pc).collect();
        self.stack_map_valid = true;
        Ok(())
    }

    /// Resets the mutation flag; the class source calls this when handing
    /// out a freshly built unit.
    pub fn mark_clean(&mut self) {
        self.mutated = false;
    }

    fn push_fragment(&mut self, kind: FragmentKind, source: &str) {
        self.fragments.push(Fragment {
            kind,
            source: source.to_string(),
        });
        self.mutated = true;
    }
}
