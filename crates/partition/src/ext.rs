//! ext2/3/4 superblock reading

/// The superblock starts this far into the filesystem.
pub(crate) const SUPERBLOCK_OFFSET: u64 = 1024;
pub(crate) const SUPERBLOCK_LEN: usize = 1024;

const EXT_MAGIC: u16 = 0xEF53;
const INCOMPAT_64BIT: u32 = 0x80;

/// Filesystem size in bytes described by an ext superblock.
pub(crate) fn filesystem_size(superblock: &[u8]) -> Result<u64, String> {
    if superblock.len() < SUPERBLOCK_LEN {
        return Err("short superblock".to_string());
    }

    let magic = u16::from_le_bytes([superblock[56], superblock[57]]);
    if magic != EXT_MAGIC {
        return Err(format!("bad magic {magic:#06x}"));
    }

    let field = |offset: usize| {
        u32::from_le_bytes([
            superblock[offset],
            superblock[offset + 1],
            superblock[offset + 2],
            superblock[offset + 3],
        ])
    };

    let blocks_lo = u64::from(field(4));
    let log_block_size = field(24);
    let incompat = field(96);
    let blocks_hi = if incompat & INCOMPAT_64BIT == 0 {
        0
    } else {
        u64::from(field(0x150))
    };

    // Block sizes above 64 KiB are not valid ext filesystems.
    if log_block_size > 6 {
        return Err(format!("bad block size exponent {log_block_size}"));
    }
    let block_size = 1024u64 << log_block_size;
    let blocks = (blocks_hi << 32) | blocks_lo;

    blocks
        .checked_mul(block_size)
        .ok_or_else(|| "filesystem size overflows".to_string())
}

#[cfg(test)]
pub(crate) fn test_superblock(blocks: u64, log_block_size: u32) -> Vec<u8> {
    let mut sb = vec![0u8; SUPERBLOCK_LEN];
    sb[56..58].copy_from_slice(&EXT_MAGIC.to_le_bytes());
    sb[4..8].copy_from_slice(&u32::try_from(blocks & 0xffff_ffff).unwrap().to_le_bytes());
    sb[24..28].copy_from_slice(&log_block_size.to_le_bytes());
    let hi = u32::try_from(blocks >> 32).unwrap();
    if hi != 0 {
        sb[96..100].copy_from_slice(&INCOMPAT_64BIT.to_le_bytes());
        sb[0x150..0x154].copy_from_slice(&hi.to_le_bytes());
    }
    sb
}
