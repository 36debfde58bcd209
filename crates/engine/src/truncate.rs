//! Call-site truncation: stop executing a member right after a given
//! instruction.
//!
//! Everything past the instruction is overwritten with no-op padding and the
//! final byte becomes a return, so control that reaches the index falls
//! through the padding and leaves the member. Used by the call and
//! field-access replacement operations when their `removeAfter` flag is set,
//! in place of substituting replacement code.

use classpatch_core::code::CodeBody;
use classpatch_core::opcode::Opcode;
use classpatch_core::result::{Error, Result};
use tracing::debug;

/// Overwrites every instruction byte after the instruction at `pc`
/// (exclusive) with NOP, writes RETURN into the final byte, and rebuilds the
/// stack map.
pub fn remove_after(code: &mut CodeBody, pc: usize) -> Result<()> {
    let instructions = code.decode()?;
    let instruction = instructions
        .iter()
        .find(|i| i.pc == pc)
        .ok_or(Error::CodeOutOfBounds {
            pc,
            len: code.len(),
        })?;
    let start = instruction.next_pc();
    let len = code.len();
    debug!(pc, start, len, "truncating member after instruction");

    if start < len {
        for offset in start..len - 1 {
            code.write_byte(offset, Opcode::NOP.as_byte())?;
        }
        code.write_byte(len - 1, Opcode::RETURN.as_byte())?;
    }
    code.rebuild_stack_map()?;
    Ok(())
}
