//! The Brainfuck-to-x86-64 compiler driver.
//!
//! Scans the source once, left to right, translating each recognized
//! command into a fixed instruction sequence appended to a [`CodeBuffer`].
//! The only state carried across the scan besides the buffer itself is the
//! loop stack used to back-patch `[`/`]` jump targets.

use anyhow::{bail, Result};

use crate::emitter::{CodeBuffer, TAPE_BASE};

/// `[` pushes a loop stack entry once per open brace; `]` pops exactly one.
/// Nesting past this depth is a resource-limit error, not a crash.
pub const MAX_LOOP_DEPTH: usize = 1024;

/// A pending, not-yet-back-patched loop opened by `[`.
struct LoopFrame {
    /// Offset of the `jz`'s 4-byte displacement slot.
    disp_slot: usize,
    /// Offset of the `cmp` that starts this loop's test, i.e. the address
    /// the matching `]`'s `jnz` must branch back to. Recorded here instead
    /// of rederived from `disp_slot` at pop time.
    loop_top: usize,
}

/// Compile a Brainfuck source buffer into a flat x86-64 machine-code image.
///
/// Bytes outside `{>,<,+,-,.,,,[,]}` are skipped silently, so the result is
/// identical for any two sources differing only in such bytes.
pub fn compile(source: &[u8]) -> Result<Vec<u8>> {
    let mut code = CodeBuffer::new();
    let mut loop_stack: Vec<LoopFrame> = Vec::new();

    emit_prologue(&mut code);

    for &byte in source {
        match byte {
            b'>' => emit_inc_dp(&mut code),
            b'<' => emit_dec_dp(&mut code),
            b'+' => emit_inc_cell(&mut code),
            b'-' => emit_dec_cell(&mut code),
            b'.' => emit_write(&mut code),
            b',' => emit_read(&mut code),
            b'[' => {
                if loop_stack.len() >= MAX_LOOP_DEPTH {
                    bail!("too many nested loops");
                }
                let loop_top = emit_cmp_cell_zero(&mut code);
                code.emit_bytes(&[0x0F, 0x84]);
                let disp_slot = code.emit_u32_placeholder();
                loop_stack.push(LoopFrame { disp_slot, loop_top });
            }
            b']' => {
                let frame = loop_stack
                    .pop()
                    .ok_or_else(|| anyhow::anyhow!("loop end without matching start"))?;
                emit_cmp_cell_zero(&mut code);
                code.emit_bytes(&[0x0F, 0x85]);
                let back_slot = code.emit_u32_placeholder();

                let after_jne = back_slot as i64 + 4;
                let fwd = after_jne - (frame.disp_slot as i64 + 4);
                code.patch_u32(frame.disp_slot, fwd as i32);

                let back = frame.loop_top as i64 - (back_slot as i64 + 4);
                code.patch_u32(back_slot, back as i32);
            }
            _ => {} // comment byte, ignored
        }
    }

    if !loop_stack.is_empty() {
        bail!("unclosed loops detected");
    }

    emit_epilogue(&mut code);

    Ok(code.into_vec())
}

/// `mov r12, TAPE_BASE`. The tape address is a compile-time constant, so it
/// is baked in directly here rather than patched later.
fn emit_prologue(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x49, 0xBC]);
    code.emit_u64_le(TAPE_BASE);
}

/// `mov rax, 60; xor rdi, rdi; syscall` — `exit_group(0)`.
fn emit_epilogue(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x48, 0xC7, 0xC0, 0x3C, 0x00, 0x00, 0x00]);
    code.emit_bytes(&[0x48, 0x31, 0xFF]);
    code.emit_bytes(&[0x0F, 0x05]);
}

/// `inc r12`
fn emit_inc_dp(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x49, 0xFF, 0xC4]);
}

/// `dec r12`
fn emit_dec_dp(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x49, 0xFF, 0xCC]);
}

/// `inc BYTE PTR [r12]`
fn emit_inc_cell(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x41, 0xFE, 0x04, 0x24]);
}

/// `dec BYTE PTR [r12]`
fn emit_dec_cell(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x41, 0xFE, 0x0C, 0x24]);
}

/// `mov rax,1; mov rdi,1; mov rsi,r12; mov rdx,1; syscall` — `write(1, [r12], 1)`.
fn emit_write(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00]);
    code.emit_bytes(&[0x48, 0xC7, 0xC7, 0x01, 0x00, 0x00, 0x00]);
    code.emit_bytes(&[0x4C, 0x89, 0xE6]);
    code.emit_bytes(&[0x48, 0xC7, 0xC2, 0x01, 0x00, 0x00, 0x00]);
    code.emit_bytes(&[0x0F, 0x05]);
}

/// `xor rax,rax; xor rdi,rdi; mov rsi,r12; mov rdx,1; syscall` — `read(0, [r12], 1)`.
fn emit_read(code: &mut CodeBuffer) {
    code.emit_bytes(&[0x48, 0x31, 0xC0]);
    code.emit_bytes(&[0x48, 0x31, 0xFF]);
    code.emit_bytes(&[0x4C, 0x89, 0xE6]);
    code.emit_bytes(&[0x48, 0xC7, 0xC2, 0x01, 0x00, 0x00, 0x00]);
    code.emit_bytes(&[0x0F, 0x05]);
}

/// `cmp BYTE PTR [r12], 0`. Returns the offset this test started at, which
/// for a `[` is the loop-top address its matching `]` must branch back to.
fn emit_cmp_cell_zero(code: &mut CodeBuffer) -> usize {
    code.emit_bytes(&[0x41, 0x80, 0x3C, 0x24, 0x00])
}
