//! Assembles the final ELF64 image: a 64-byte header, two 56-byte program
//! headers, and the emitted machine code, concatenated in that order.
//!
//! This module performs no code generation of its own; it only lays out
//! bytes around a machine-code buffer handed to it by [`crate::compiler`].

use anyhow::{bail, Result};

use crate::emitter::TAPE_BASE;

/// Load address of the text segment (headers + code).
pub const TEXT_BASE: u64 = 0x400000;
/// Size of the 64-byte ehdr plus two 56-byte phdrs.
pub const HEADER_LEN: u64 = 0x40 + 56 + 56;
/// Size in bytes of the Brainfuck tape, mapped R-W and zero-filled by the kernel.
pub const TAPE_SIZE: u64 = 30_000;
/// Segment alignment requested in both program headers.
const SEGMENT_ALIGN: u64 = 0x1000;

/// Build the complete ELF64 executable image for `code`.
///
/// Returns an error if `code` is large enough that the text segment loaded
/// at [`TEXT_BASE`] would overlap the tape segment loaded at [`TAPE_BASE`];
/// the fixed 2 MiB gap between the two bases caps how large a single
/// compiled program can be.
pub fn build_image(code: &[u8]) -> Result<Vec<u8>> {
    let file_size = HEADER_LEN + code.len() as u64;
    if file_size >= TAPE_BASE - TEXT_BASE {
        bail!(
            "compiled program is too large ({file_size} bytes): text segment at 0x{TEXT_BASE:x} \
             would overlap the tape segment at 0x{TAPE_BASE:x}"
        );
    }

    let mut image = Vec::with_capacity(file_size as usize);
    write_ehdr(&mut image);
    write_text_phdr(&mut image, file_size);
    write_tape_phdr(&mut image);
    debug_assert_eq!(image.len() as u64, HEADER_LEN);
    image.extend_from_slice(code);

    Ok(image)
}

fn write_ehdr(out: &mut Vec<u8>) {
    // e_ident: EI_MAG, ELFCLASS64, little-endian, EV_CURRENT, SysV ABI, padding.
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    out.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
    out.extend_from_slice(&0x3Eu16.to_le_bytes()); // e_machine = EM_X86_64
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&(TEXT_BASE + HEADER_LEN).to_le_bytes()); // e_entry
    out.extend_from_slice(&0x40u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    out.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&2u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
}

fn write_text_phdr(out: &mut Vec<u8>, file_size: u64) {
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
    out.extend_from_slice(&5u32.to_le_bytes()); // p_flags = R | X
    out.extend_from_slice(&0u64.to_le_bytes()); // p_offset
    out.extend_from_slice(&TEXT_BASE.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&TEXT_BASE.to_le_bytes()); // p_paddr
    out.extend_from_slice(&file_size.to_le_bytes()); // p_filesz
    out.extend_from_slice(&file_size.to_le_bytes()); // p_memsz
    out.extend_from_slice(&SEGMENT_ALIGN.to_le_bytes()); // p_align
}

fn write_tape_phdr(out: &mut Vec<u8>) {
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
    out.extend_from_slice(&6u32.to_le_bytes()); // p_flags = R | W
    out.extend_from_slice(&0u64.to_le_bytes()); // p_offset
    out.extend_from_slice(&TAPE_BASE.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&TAPE_BASE.to_le_bytes()); // p_paddr
    out.extend_from_slice(&0u64.to_le_bytes()); // p_filesz (BSS, nothing from the file)
    out.extend_from_slice(&TAPE_SIZE.to_le_bytes()); // p_memsz
    out.extend_from_slice(&SEGMENT_ALIGN.to_le_bytes()); // p_align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_len_matches_the_176_byte_layout() {
        assert_eq!(HEADER_LEN, 0xB0);
    }

    #[test]
    fn image_starts_with_elf_magic_and_has_the_right_size() {
        let code = vec![0u8; 22];
        let image = build_image(&code).unwrap();
        assert_eq!(image.len() as u64, HEADER_LEN + 22);
        assert_eq!(&image[0..4], b"\x7FELF");
    }

    #[test]
    fn entry_point_skips_past_the_headers() {
        let image = build_image(&[]).unwrap();
        let entry = u64::from_le_bytes(image[24..32].try_into().unwrap());
        assert_eq!(entry - TEXT_BASE, HEADER_LEN);
    }

    #[test]
    fn text_segment_filesz_equals_memsz() {
        let code = vec![0u8; 100];
        let image = build_image(&code).unwrap();
        let phdr1 = &image[0x40..0x40 + 56];
        let filesz = u64::from_le_bytes(phdr1[32..40].try_into().unwrap());
        let memsz = u64::from_le_bytes(phdr1[40..48].try_into().unwrap());
        assert_eq!(filesz, memsz);
        assert_eq!(filesz, HEADER_LEN + 100);
    }

    #[test]
    fn tape_segment_is_bss_style() {
        let image = build_image(&[]).unwrap();
        let phdr2 = &image[0x78..0x78 + 56];
        let vaddr = u64::from_le_bytes(phdr2[16..24].try_into().unwrap());
        let filesz = u64::from_le_bytes(phdr2[32..40].try_into().unwrap());
        let memsz = u64::from_le_bytes(phdr2[40..48].try_into().unwrap());
        assert_eq!(vaddr, TAPE_BASE);
        assert_eq!(filesz, 0);
        assert_eq!(memsz, TAPE_SIZE);
    }

    #[test]
    fn oversized_code_is_rejected() {
        let code = vec![0u8; (TAPE_BASE - TEXT_BASE) as usize];
        assert!(build_image(&code).is_err());
    }
}
