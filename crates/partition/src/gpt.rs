//! GUID partition table parsing

use serde::{Deserialize, Serialize};

pub(crate) const SECTOR_SIZE: u64 = 512;
pub(crate) const HEADER_OFFSET: u64 = SECTOR_SIZE;
pub(crate) const HEADER_LEN: usize = 92;

const SIGNATURE: &[u8; 8] = b"EFI PART";
const MIN_ENTRY_SIZE: u32 = 128;
const MAX_ENTRY_SIZE: u32 = 4096;
const MAX_ENTRIES: u32 = 1024;
const NAME_OFFSET: usize = 56;
const NAME_LEN: usize = 72;

/// One used slot of the partition entry array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// 1-based slot number
    pub number: u32,
    pub name: String,
    /// Byte offset of the partition within the image
    pub offset: u64,
    /// Partition length in bytes
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GptHeader {
    pub entries_lba: u64,
    pub entry_count: u32,
    pub entry_size: u32,
}

impl GptHeader {
    /// Byte offset of the entry array; `None` if it overflows.
    pub(crate) fn entries_offset(&self) -> Option<u64> {
        self.entries_lba.checked_mul(SECTOR_SIZE)
    }

    pub(crate) fn entries_len(&self) -> usize {
        self.entry_count as usize * self.entry_size as usize
    }
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn parse_header(buf: &[u8]) -> Result<GptHeader, String> {
    if buf.len() < HEADER_LEN {
        return Err("image too small for a GPT header".to_string());
    }
    if &buf[..8] != SIGNATURE {
        return Err("missing EFI PART signature".to_string());
    }

    let header = GptHeader {
        entries_lba: u64_at(buf, 72),
        entry_count: u32_at(buf, 80),
        entry_size: u32_at(buf, 84),
    };

    if header.entry_size < MIN_ENTRY_SIZE
        || header.entry_size > MAX_ENTRY_SIZE
        || header.entry_size % 8 != 0
    {
        return Err(format!("bad entry size {}", header.entry_size));
    }
    if header.entry_count == 0 || header.entry_count > MAX_ENTRIES {
        return Err(format!("bad entry count {}", header.entry_count));
    }
    if header.entries_lba < 2 || header.entries_offset().is_none() {
        return Err(format!("bad entry array LBA {}", header.entries_lba));
    }
    Ok(header)
}

fn decode_name(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

pub(crate) fn parse_entries(buf: &[u8], header: &GptHeader) -> Result<Vec<PartitionInfo>, String> {
    let mut partitions = Vec::new();

    for (index, raw) in buf
        .chunks_exact(header.entry_size as usize)
        .take(header.entry_count as usize)
        .enumerate()
    {
        // An all-zero type GUID marks an unused slot.
        if raw[..16].iter().all(|&b| b == 0) {
            continue;
        }

        let first_lba = u64_at(raw, 32);
        let last_lba = u64_at(raw, 40);
        let name = decode_name(&raw[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
        if last_lba < first_lba {
            return Err(format!("partition {name} ends before it starts"));
        }

        let offset = first_lba.checked_mul(SECTOR_SIZE);
        let size = (last_lba - first_lba)
            .checked_add(1)
            .and_then(|sectors| sectors.checked_mul(SECTOR_SIZE));
        let (Some(offset), Some(size)) = (offset, size) else {
            return Err(format!("partition {name} lies beyond addressable bytes"));
        };

        partitions.push(PartitionInfo {
            number: u32::try_from(index + 1).unwrap_or(u32::MAX),
            name,
            offset,
            size,
        });
    }

    Ok(partitions)
}
