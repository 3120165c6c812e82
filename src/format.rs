//! Image file formats, for loading memory contents into a target.
use std::str;
use std::{borrow::Cow, path::Path};

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    PlainHex,
    IntelHex,
    Binary,
}

pub fn read_image_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    match format {
        ImageFormat::PlainHex => read_hex(str::from_utf8(&raw)?),
        ImageFormat::IntelHex => read_ihex(str::from_utf8(&raw)?),
        ImageFormat::Binary => Ok(raw),
    }
}

pub fn guess_format(path: &Path, raw: &[u8]) -> ImageFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase();
    if ["ihex", "ihe", "h86", "hex", "a43", "a90"].contains(&&*ext) {
        return ImageFormat::IntelHex;
    }

    let is_hex_text = |c: u8| c.is_ascii_hexdigit() || c.is_ascii_whitespace();
    if raw.is_empty() {
        ImageFormat::Binary
    } else if raw[0] == b':' && raw.iter().all(|&c| c == b':' || is_hex_text(c)) {
        ImageFormat::IntelHex
    } else if raw.iter().all(|&c| is_hex_text(c)) {
        ImageFormat::PlainHex
    } else {
        ImageFormat::Binary
    }
}

/// Hex digits, whitespace ignored.
pub fn read_hex(data: &str) -> Result<Vec<u8>> {
    let digits: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut base_address = 0;

    let mut records = vec![];
    for record in ihex::Reader::new(data) {
        let record = record?;
        use Record::*;
        match record {
            Data { offset, value } => {
                let offset = base_address + offset as u32;

                records.push((offset, value.into()));
            }
            EndOfFile => (),
            ExtendedSegmentAddress(address) => {
                base_address = (address as u32) * 16;
            }
            StartSegmentAddress { .. } => (),
            ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            StartLinearAddress(_) => (),
        };
    }
    merge_sections(records)
}

/// Lay sections out in one image, gaps zero-filled.
fn merge_sections(mut sections: Vec<(u32, Cow<[u8]>)>) -> Result<Vec<u8>> {
    sections.sort(); // order by start address

    let Some(start_address) = sections.first().map(|s| s.0) else {
        anyhow::bail!("image contains no data");
    };
    let mut end_address = start_address;
    for (addr, sect) in &sections {
        anyhow::ensure!(
            *addr >= end_address,
            "section at {:#010x} overlaps the one before it (ends at {:#010x})",
            addr,
            end_address
        );
        end_address = u32::try_from(sect.len())
            .ok()
            .and_then(|len| addr.checked_add(len))
            .ok_or_else(|| anyhow::format_err!("section at {:#010x} runs past 4 GiB", addr))?;
    }

    let mut binary = vec![0u8; (end_address - start_address) as usize];
    for (addr, sect) in sections {
        let sect_start = (addr - start_address) as usize;
        binary[sect_start..sect_start + sect.len()].copy_from_slice(&sect);
    }
    Ok(binary)
}

/// Pack bytes into big-endian words, zero-padding the last one.
pub fn bytes_to_words(raw: &[u8]) -> Vec<u32> {
    raw.chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

/// Unpack words into big-endian bytes.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}
