//! Lock-primitive to monitor conversion.
//!
//! Calls to `lock()`/`unlock()` on recognized lock types are rewritten into
//! the native monitor opcodes: the call's opcode byte becomes
//! MONITORENTER/MONITOREXIT and its operand bytes become no-op padding.
//! Interface calls carry four operand bytes where virtual calls carry two,
//! so the padding width depends on the call kind.

use classpatch_core::code::CodeBody;
use classpatch_core::opcode::Opcode;
use classpatch_core::pool::ConstPool;
use classpatch_core::result::Result;
use tracing::debug;

/// Target type suffix for interface lock calls.
const INTERFACE_LOCK_SUFFIX: &str = "Lock";
/// Target type suffix for virtual lock calls.
const VIRTUAL_LOCK_SUFFIX: &str = "NativeMutex";

/// Rewrites matching lock calls in `code`, rebuilds the stack map and
/// returns the conversion count.
pub fn convert_lock_calls(code: &mut CodeBody, pool: &ConstPool) -> Result<usize> {
    let instructions = code.decode()?;
    let mut converted = 0;

    for instruction in instructions {
        let (suffix, padding) = match instruction.op {
            Opcode::INVOKEINTERFACE => (INTERFACE_LOCK_SUFFIX, 4),
            Opcode::INVOKEVIRTUAL => (VIRTUAL_LOCK_SUFFIX, 2),
            _ => continue,
        };
        let index = code.u16_at(instruction.pc + 1)?;
        let target = match instruction.op {
            Opcode::INVOKEINTERFACE => pool.interface_method_ref(index),
            _ => pool.method_ref(index),
        }?;
        if !target.class.ends_with(suffix) {
            continue;
        }
        let replacement = match target.name.as_str() {
            "lock" => Opcode::MONITORENTER,
            "unlock" => Opcode::MONITOREXIT,
            _ => continue,
        };
        debug!(
            pc = instruction.pc,
            target = %target.class,
            method = %target.name,
            "converting lock call to monitor opcode"
        );
        code.write_byte(instruction.pc, replacement.as_byte())?;
        for offset in 1..=padding {
            code.write_byte(instruction.pc + offset, Opcode::NOP.as_byte())?;
        }
        converted += 1;
    }

    code.rebuild_stack_map()?;
    debug!(converted, "replaced lock/unlock calls");
    Ok(converted)
}
