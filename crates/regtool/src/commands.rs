//! Register commands. Each writes its human-readable output to `out`.

use std::io::Write;

use anyhow::{bail, Context, Result};
use regtool_core::{
    read_convert, ErrorKind, RegisterBackend, RegisterError, ReportConfig, StatusReport,
};

/// Words per dump line; a wide line holds half as many 64-bit values.
const LINE_WORDS: usize = 8;

/// Address advance of one dump line.
const LINE_SPAN: u32 = 8;

/// Width of the right-aligned register name column in `read` output.
const NAME_WIDTH: usize = 50;

/// Parses a decimal or `0x`-prefixed hexadecimal number.
///
/// # Errors
///
/// Returns a message naming the rejected text.
pub fn parse_number(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("invalid number: {text}"))
}

/// A command target: a raw address or the registers a name pattern matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Numeric word address.
    Address(u32),
    /// Matching register names, in backend order.
    Names(Vec<String>),
}

impl Target {
    /// Resolves `target` as a number first, then as a register glob.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] when no register matches.
    pub fn resolve<B: RegisterBackend + ?Sized>(backend: &B, target: &str) -> Result<Self> {
        if let Ok(address) = parse_number(target) {
            return Ok(Self::Address(address));
        }
        let names = backend.enumerate_names(target)?;
        if names.is_empty() {
            return Err(RegisterError::bad_reg_name(target).into());
        }
        Ok(Self::Names(names))
    }

    fn single_address<B: RegisterBackend + ?Sized>(backend: &B, target: &str) -> Result<u32> {
        match Self::resolve(backend, target)? {
            Self::Address(address) => Ok(address),
            Self::Names(names) => match names.as_slice() {
                [name] => Ok(backend.address(name)?),
                _ => bail!("{target} matches {} registers, expected one", names.len()),
            },
        }
    }
}

/// Options of the `read` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Values to read; each is two words when `wide`.
    pub count: usize,
    /// Print 64-bit values built from word pairs.
    pub wide: bool,
    /// Leave zero values blank.
    pub skip_zero: bool,
    /// Word offset added to the target address.
    pub offset: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            count: 1,
            wide: false,
            skip_zero: false,
            offset: 0,
        }
    }
}

/// Lists registers matching `pattern`, optionally only those whose
/// parameter `(key, value)` matches.
///
/// # Errors
///
/// Returns an error for an invalid pattern or a failed write.
pub fn list<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &B,
    out: &mut W,
    pattern: &str,
    describe: bool,
    parameter: Option<(&str, &str)>,
) -> Result<()> {
    let mut names = backend.enumerate_names(pattern)?;
    if let Some((key, value)) = parameter {
        let matching = backend.find_with_parameter(key, value)?;
        names.retain(|name| matching.contains(name));
    }

    for (index, name) in names.iter().enumerate() {
        write!(
            out,
            "  {:>3}: {name:<60} (addr={:08x} mask={:08x}) {}{}",
            index + 1,
            backend.address(name)?,
            backend.mask(name)?,
            backend.mode(name)?,
            backend.permissions(name)?
        )?;
        let size = backend.size(name)?;
        if size > 1 {
            write!(out, " size=0x{size:08X}")?;
        }
        writeln!(out)?;
        if describe {
            writeln!(out, "       {}", backend.description(name)?)?;
        }
    }
    Ok(())
}

fn dump<W: Write + ?Sized>(
    out: &mut W,
    start: u32,
    words: &[u32],
    options: &ReadOptions,
) -> Result<()> {
    let values: Vec<u64> = if options.wide {
        words
            .chunks(2)
            .map(|pair| match pair {
                [low, high] => u64::from(*low) | (u64::from(*high) << 32),
                _ => pair.iter().copied().map(u64::from).sum(),
            })
            .collect()
    } else {
        words.iter().copied().map(u64::from).collect()
    };
    let (per_line, digits) = if options.wide {
        (LINE_WORDS / 2, 16)
    } else {
        (LINE_WORDS, 8)
    };

    let mut address = start;
    for line in values.chunks(per_line) {
        write!(out, "0x{address:08x}:")?;
        for value in line {
            if options.skip_zero && *value == 0 {
                write!(out, " {:w$}", "", w = digits + 2)?;
            } else {
                write!(out, " 0x{value:0digits$X}")?;
            }
        }
        writeln!(out)?;
        address = address.wrapping_add(LINE_SPAN);
    }
    Ok(())
}

/// Reads an address range or the registers matching a name pattern.
///
/// Write-only registers are reported instead of read.
///
/// # Errors
///
/// Returns an error for unknown targets, failed reads or a failed write.
pub fn read<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    target: &str,
    options: &ReadOptions,
) -> Result<()> {
    let words = if options.wide {
        options.count * 2
    } else {
        options.count
    };
    let offset = options.offset;

    let names = match Target::resolve(backend, target)? {
        Target::Address(address) => {
            let start = address.wrapping_add(offset);
            if offset != 0 {
                writeln!(out, "applying offset 0x{offset:08X} to 0x{address:08X}")?;
            }
            let data = backend.read_block(start, words)?;
            return dump(out, start, &data, options);
        }
        Target::Names(names) => names,
    };

    for name in names {
        if !backend.permissions(&name)?.contains('r') {
            if options.count == 1 {
                writeln!(out, "{name:>NAME_WIDTH$}: write-only")?;
            }
            continue;
        }
        if options.count == 1 {
            let (label, value) = if offset == 0 {
                (name.clone(), backend.read_name(&name)?)
            } else {
                (
                    format!("{name} + 0x{offset:08X}"),
                    backend.read_offset(&name, offset)?,
                )
            };
            if !options.skip_zero || value != 0 {
                writeln!(out, "{label:>NAME_WIDTH$}: 0x{value:08X}")?;
            }
            continue;
        }

        let start = backend.address(&name)?.wrapping_add(offset);
        if offset == 0 {
            writeln!(out, "{name}:")?;
        } else {
            writeln!(out, "{name} + 0x{offset:08X}:")?;
        }
        let data = backend.read_block(start, words)?;
        dump(out, start, &data, options)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Reads `count` words from one FIFO address.
///
/// # Errors
///
/// Returns an error when the target is not a single register or address, or
/// when a read fails.
pub fn read_fifo<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    target: &str,
    count: usize,
) -> Result<()> {
    let address = Target::single_address(backend, target)?;
    let data = backend.read_fifo(address, count)?;
    writeln!(out, "read {} words from {target}:", data.len())?;
    for (index, word) in data.iter().enumerate() {
        writeln!(out, "  {index:>4}: 0x{word:08X}")?;
    }
    Ok(())
}

/// Writes `value` `count` times to one FIFO address.
///
/// # Errors
///
/// Returns an error when the target is not a single register or address, or
/// when a write fails.
pub fn write_fifo<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    target: &str,
    value: u32,
    count: usize,
) -> Result<()> {
    if count == 0 {
        bail!("write count must be at least 1");
    }
    let address = Target::single_address(backend, target)?;
    backend.write_fifo(address, &vec![value; count])?;
    writeln!(out, "wrote {count} words to {target} (0x{address:08X})")?;
    Ok(())
}

/// Reads and converts every register matching `pattern` using its `Format`.
///
/// Registers with an unsupported format are reported and skipped.
///
/// # Errors
///
/// Returns an error for an invalid pattern, any other conversion failure or
/// a failed write.
pub fn convert<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    pattern: &str,
) -> Result<()> {
    for name in backend.enumerate_names(pattern)? {
        if !backend.permissions(&name)?.contains('r') {
            writeln!(out, "{name}:    No read permission.")?;
            continue;
        }
        match read_convert(backend, &name) {
            Ok(value) => writeln!(out, "{name}:   {value}")?,
            Err(err) if err.kind() == ErrorKind::FormattingNotImplemented => {
                tracing::warn!(register = %name, "{err}");
                writeln!(out, "{name}:   {err}")?;
            }
            Err(err) => return Err(err).with_context(|| format!("converting {name}")),
        }
    }
    Ok(())
}

/// Writes a register or address range. Without a value a named register
/// gets an action write.
///
/// # Errors
///
/// Returns an error for unknown or ambiguous targets, a missing value for an
/// address write, or a failed transfer.
pub fn write<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    target: &str,
    value: Option<u32>,
    count: usize,
    offset: u32,
) -> Result<()> {
    if count == 0 {
        bail!("write count must be at least 1");
    }
    let name = match Target::resolve(backend, target)? {
        Target::Address(address) => {
            let Some(value) = value else {
                bail!("writing address 0x{address:08X} needs a value");
            };
            let start = address.wrapping_add(offset);
            let label = format!("address 0x{start:08X}");
            return write_range(backend, out, &label, start, value, count);
        }
        Target::Names(names) => match <[String; 1]>::try_from(names) {
            Ok([name]) => name,
            Err(names) => bail!(
                "{target} matches {} registers, writes need exactly one",
                names.len()
            ),
        },
    };

    match value {
        None => {
            backend.write_action(&name)?;
            writeln!(out, "action write to {name}")?;
        }
        Some(value) if count == 1 && offset == 0 => {
            backend.write_name(&name, value)?;
            writeln!(out, "write to register {name}")?;
            if backend.permissions(&name)?.contains('r') {
                writeln!(out, "{name:>NAME_WIDTH$}: 0x{:08X}", backend.read_name(&name)?)?;
            }
        }
        Some(value) => {
            let start = backend.address(&name)?.wrapping_add(offset);
            let label = if offset == 0 {
                format!("register {name}")
            } else {
                format!("register {name} + 0x{offset:08X}")
            };
            write_range(backend, out, &label, start, value, count)?;
        }
    }
    Ok(())
}

fn write_range<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    label: &str,
    start: u32,
    value: u32,
    count: usize,
) -> Result<()> {
    backend.write_block(start, &vec![value; count])?;
    if count == 1 {
        writeln!(out, "write to {label}")?;
    } else {
        let end = u32::try_from(count)
            .map(|count| start.wrapping_add(count - 1))
            .context("write count does not fit the address space")?;
        writeln!(out, "write to {label}: 0x{start:08X} to 0x{end:08X}")?;
    }
    Ok(())
}

/// Renders the full status report at `level`.
///
/// # Errors
///
/// Returns an error when registers cannot be enumerated or output fails.
pub fn status<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
    backend: &mut B,
    out: &mut W,
    config: ReportConfig,
    level: u32,
    table: Option<&str>,
) -> Result<()> {
    let mut report = StatusReport::new(config);
    report.report(backend, out, level, table)?;
    if !report.errors().is_empty() {
        tracing::warn!(
            failures = report.errors().total(),
            "status report finished with errors"
        );
    }
    Ok(())
}
