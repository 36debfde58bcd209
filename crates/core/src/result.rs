//! Core results and error types

use thiserror::Error;

/// Core error type encompassing all core module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A class was not found by the class source.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// A read or write landed outside the member's code buffer.
    #[error("code offset {pc} out of bounds (length {len})")]
    CodeOutOfBounds {
        /// The offending offset.
        pc: usize,
        /// Length of the code buffer.
        len: usize,
    },

    /// A member with the same name and signature already exists.
    #[error("duplicate member {member} in {class}")]
    DuplicateMember {
        /// Declaring class name.
        class: String,
        /// Qualified member name.
        member: String,
    },

    /// A declared field was not found on the class.
    #[error("field {field} not found in {class}")]
    FieldNotFound {
        /// Declaring class name.
        class: String,
        /// Field name.
        field: String,
    },

    /// An identifier string could not be parsed.
    #[error("invalid identifier `{raw}`: {msg}")]
    InvalidIdentifier {
        /// The raw identifier text.
        raw: String,
        /// Description of the parse failure.
        msg: String,
    },

    /// A method reference did not resolve against the class.
    #[error("method {member} not found in {class}")]
    MemberNotFound {
        /// Declaring class name.
        class: String,
        /// Qualified member name.
        member: String,
    },

    /// A constant pool index was out of range.
    #[error("constant pool index {0} out of range")]
    PoolIndex(u16),

    /// A constant pool entry had an unexpected kind.
    #[error("constant pool entry {index} is not a {expected}")]
    PoolType {
        /// The 1-based pool index.
        index: u16,
        /// The kind the caller expected.
        expected: &'static str,
    },

    /// The code buffer ended in the middle of an instruction.
    #[error("truncated instruction at offset {pc}")]
    TruncatedInstruction {
        /// Offset of the instruction start.
        pc: usize,
    },
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
