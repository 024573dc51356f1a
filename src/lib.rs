//! Ahead-of-time compiler that turns a Brainfuck source program into a
//! standalone ELF64 x86-64 Linux executable: no runtime, no libc, no
//! dynamic linking. The produced binary talks to the kernel directly via
//! raw `read`/`write`/`exit_group` syscalls.

pub mod cli;
pub mod compiler;
pub mod elf;
pub mod emitter;

use anyhow::Result;

/// Compile Brainfuck `source` straight to a finished ELF64 image.
///
/// Convenience wrapper over [`compiler::compile`] followed by
/// [`elf::build_image`], for callers that just want the bytes.
pub fn compile_to_elf(source: &[u8]) -> Result<Vec<u8>> {
    let code = compiler::compile(source)?;
    elf::build_image(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_compiles_to_a_valid_image() {
        let src = include_bytes!("../tests/fixtures/hello_world.bf");
        let image = compile_to_elf(src).unwrap();
        assert_eq!(&image[0..4], b"\x7FELF");
    }
}
