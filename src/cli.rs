//! Command-line front end: turns `argv` into an input/output path pair,
//! drives the compiler and ELF assembler, and reports the outcome on
//! stderr. None of the byte-level logic lives here; this module is glue.

use std::fs;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use argh::FromArgs;

/// Compile a Brainfuck source file into a standalone ELF64 x86-64 executable.
#[derive(FromArgs, Debug, PartialEq)]
pub struct Args {
    /// path to the Brainfuck source file
    #[argh(positional)]
    pub input: PathBuf,

    /// output path for the compiled executable (default: a.out)
    #[argh(option, short = 'o')]
    pub output: Option<PathBuf>,
}

const DEFAULT_OUTPUT: &str = "a.out";

/// Permissions given to the freshly created output file: `rwxr-xr-x`.
const OUTPUT_MODE: u32 = 0o755;

/// Parse `args` (excluding the program name) and run the compiler end to end.
///
/// Returns `Ok(())` on success, having already printed the success message
/// to stderr. Every failure — usage, I/O, syntax, or resource-limit — comes
/// back as an `Err` with a message suitable for display at the top level.
pub fn run(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;
    let output = args.output.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let source = fs::read(&args.input)
        .with_context(|| format!("failed to read input file {}", args.input.display()))?;

    let code = crate::compiler::compile(&source)
        .with_context(|| format!("failed to compile {}", args.input.display()))?;
    let image = crate::elf::build_image(&code)?;

    write_executable(&output, &image)
        .with_context(|| format!("failed to write output file {}", output.display()))?;

    eprintln!(
        "wrote ELF64 x86_64 Brainf*ck program to {}",
        output.display()
    );
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Args> {
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    match Args::from_args(&["bfelfx64"], &arg_refs) {
        Ok(parsed) => Ok(parsed),
        Err(early_exit) => {
            if early_exit.status.is_ok() {
                // --help was requested: argh already rendered the message.
                print!("{}", early_exit.output);
                std::process::exit(0);
            }
            bail!("{}", early_exit.output.trim_end())
        }
    }
}

fn write_executable(path: &std::path::Path, image: &[u8]) -> std::io::Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(OUTPUT_MODE)
        .open(path)?;
    file.write_all(image)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_a_usage_error() {
        let err = parse_args(&[]).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse_args(&["--bogus".to_string()]).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn output_defaults_to_a_out() {
        let parsed = parse_args(&["prog.bf".to_string()]).unwrap();
        assert_eq!(parsed.output, None);
    }

    #[test]
    fn output_flag_is_captured() {
        let parsed =
            parse_args(&["prog.bf".to_string(), "-o".to_string(), "out".to_string()]).unwrap();
        assert_eq!(parsed.output, Some(PathBuf::from("out")));
    }
}
