#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Partition extraction from ChromeOS disk images
//!
//! Reads the GPT of a full disk image and copies single partitions out to
//! standalone files. The root partition can be cut down to the size of the
//! ext filesystem it holds, dropping the verity hash tree that follows it.

mod ext;
mod gpt;

pub use gpt::PartitionInfo;

use paygen_errors::{Error, PartitionError, StorageError};
use paygen_platform::fs;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Kernel partition used for payload generation
pub const KERNEL_PARTITION: &str = "KERN-A";
/// Root filesystem partition used for payload generation
pub const ROOT_PARTITION: &str = "ROOT-A";

fn invalid_table(image: &Path, message: impl Into<String>) -> Error {
    PartitionError::InvalidPartitionTable {
        image: image.display().to_string(),
        message: message.into(),
    }
    .into()
}

async fn open(image: &Path) -> Result<File, Error> {
    File::open(image)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, image).into())
}

async fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.read_exact(buf).await?;
    Ok(())
}

/// Parse the partition table of `image`.
///
/// # Errors
///
/// Returns `PartitionError::InvalidPartitionTable` if the image has no
/// readable GPT, or a storage error if it cannot be opened.
pub async fn read_partition_table(image: &Path) -> Result<Vec<PartitionInfo>, Error> {
    let mut file = open(image).await?;

    let mut header_buf = vec![0u8; gpt::HEADER_LEN];
    read_at(&mut file, gpt::HEADER_OFFSET, &mut header_buf)
        .await
        .map_err(|e| invalid_table(image, format!("reading header: {e}")))?;
    let header = gpt::parse_header(&header_buf).map_err(|m| invalid_table(image, m))?;

    let entries_offset = header
        .entries_offset()
        .ok_or_else(|| invalid_table(image, "entry array offset overflows"))?;
    let mut entries_buf = vec![0u8; header.entries_len()];
    read_at(&mut file, entries_offset, &mut entries_buf)
        .await
        .map_err(|e| invalid_table(image, format!("reading entries: {e}")))?;
    let partitions =
        gpt::parse_entries(&entries_buf, &header).map_err(|m| invalid_table(image, m))?;

    let image_len = file.metadata().await?.len();
    if let Some(part) = partitions
        .iter()
        .find(|p| p.offset.checked_add(p.size).map_or(true, |end| end > image_len))
    {
        return Err(invalid_table(
            image,
            format!("partition {} extends past end of image", part.name),
        ));
    }

    Ok(partitions)
}

async fn find_partition(image: &Path, name: &str) -> Result<PartitionInfo, Error> {
    read_partition_table(image)
        .await?
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| {
            PartitionError::PartitionNotFound {
                image: image.display().to_string(),
                name: name.to_string(),
            }
            .into()
        })
}

fn partial_path(out: &Path) -> PathBuf {
    let mut name = out.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    out.with_file_name(name)
}

/// Copy `len` bytes starting at `offset` into `out`, publishing it only once
/// complete.
async fn copy_range(image: &Path, offset: u64, len: u64, out: &Path) -> Result<(), Error> {
    let partial = partial_path(out);
    let result = async {
        let mut src = open(image).await?;
        src.seek(SeekFrom::Start(offset)).await?;
        let mut dst = File::create(&partial)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &partial))?;
        let copied = tokio::io::copy(&mut src.take(len), &mut dst).await?;
        dst.flush().await?;
        if copied != len {
            return Err(invalid_table(
                image,
                format!("expected {len} bytes at offset {offset}, read {copied}"),
            ));
        }
        fs::atomic_rename(&partial, out).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&partial).await;
    }
    result
}

/// Extract the partition called `name` from `image` into `out`.
///
/// # Errors
///
/// Returns `PartitionError::PartitionNotFound` if no partition has that
/// name, or any table or I/O error. Nothing is left at `out` on failure.
pub async fn extract_partition(image: &Path, name: &str, out: &Path) -> Result<(), Error> {
    let part = find_partition(image, name).await?;
    tracing::debug!(
        image = %image.display(),
        partition = name,
        offset = part.offset,
        size = part.size,
        "extracting partition"
    );
    copy_range(image, part.offset, part.size, out).await
}

/// Extract the kernel partition.
///
/// # Errors
///
/// See [`extract_partition`].
pub async fn extract_kernel(image: &Path, out: &Path) -> Result<(), Error> {
    extract_partition(image, KERNEL_PARTITION, out).await
}

/// Extract the root partition, optionally truncated to its ext filesystem.
///
/// # Errors
///
/// See [`extract_partition`]. With `truncate`, a partition without a valid
/// ext superblock, or one whose filesystem claims more space than the
/// partition holds, is `PartitionError::InvalidFilesystem`.
pub async fn extract_root(image: &Path, out: &Path, truncate: bool) -> Result<(), Error> {
    let part = find_partition(image, ROOT_PARTITION).await?;
    let mut len = part.size;

    if truncate {
        let invalid = |message: String| -> Error {
            PartitionError::InvalidFilesystem {
                name: ROOT_PARTITION.to_string(),
                message,
            }
            .into()
        };

        let mut superblock = vec![0u8; ext::SUPERBLOCK_LEN];
        let mut file = open(image).await?;
        read_at(&mut file, part.offset + ext::SUPERBLOCK_OFFSET, &mut superblock)
            .await
            .map_err(|e| invalid(format!("reading superblock: {e}")))?;
        let fs_size = ext::filesystem_size(&superblock).map_err(invalid)?;
        if fs_size > part.size {
            return Err(invalid(format!(
                "filesystem size {fs_size} exceeds partition size {}",
                part.size
            )));
        }
        len = fs_size;
    }

    tracing::debug!(
        image = %image.display(),
        size = len,
        truncated = truncate,
        "extracting root partition"
    );
    copy_range(image, part.offset, len, out).await
}


#[cfg(test)]
mod tests {
    use super::*;

    async fn write_image(dir: &Path, with_superblock: bool) -> PathBuf {
        let path = dir.join("chromiumos_test_image.bin");
        tokio::fs::write(&path, test_image::build(with_superblock))
            .await
            .unwrap();
        path
    }

    #[tokio::test]
    async fn lists_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), true).await;

        let table = read_partition_table(&image).await.unwrap();
        let names: Vec<_> = table.iter().map(|p| (p.number, p.name.as_str())).collect();
        assert_eq!(names, [(2, "KERN-A"), (3, "ROOT-A")]);
        assert_eq!(table[0].offset, test_image::KERN_FIRST_LBA * 512);
        assert_eq!(table[1].size, test_image::ROOT_SECTORS * 512);
    }

    #[tokio::test]
    async fn extracts_kernel_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), true).await;
        let out = dir.path().join("kern.bin");

        extract_kernel(&image, &out).await.unwrap();
        let data = tokio::fs::read(&out).await.unwrap();
        assert_eq!(data.len() as u64, test_image::KERN_SECTORS * 512);
        assert!(data.iter().all(|&b| b == 0x4B));
    }

    #[tokio::test]
    async fn root_truncation_uses_filesystem_size() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), true).await;

        let full = dir.path().join("root_full.bin");
        extract_root(&image, &full, false).await.unwrap();
        assert_eq!(
            tokio::fs::metadata(&full).await.unwrap().len(),
            test_image::ROOT_SECTORS * 512
        );

        let cut = dir.path().join("root.bin");
        extract_root(&image, &cut, true).await.unwrap();
        assert_eq!(tokio::fs::metadata(&cut).await.unwrap().len(), 8 * 1024);
    }

    #[tokio::test]
    async fn truncation_without_superblock_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), false).await;
        let out = dir.path().join("root.bin");

        let err = extract_root(&image, &out, true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Partition(PartitionError::InvalidFilesystem { .. })
        ));
        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }

    #[tokio::test]
    async fn missing_partition_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), true).await;
        let out = dir.path().join("x.bin");

        let err = extract_partition(&image, "ROOT-B", &out).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Partition(PartitionError::PartitionNotFound { .. })
        ));
        assert!(!out.exists());
    }

    async fn assert_invalid_table(image: &Path) {
        let err = read_partition_table(image).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Partition(PartitionError::InvalidPartitionTable { .. })
            ),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn overflowing_partition_bounds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let mut bytes = test_image::build(true);
        let slot = 1024 + 2 * 128;
        bytes[slot + 32..slot + 40].copy_from_slice(&(u64::MAX / 256).to_le_bytes());
        bytes[slot + 40..slot + 48].copy_from_slice(&(u64::MAX / 256).to_le_bytes());
        let far = dir.path().join("far.bin");
        tokio::fs::write(&far, &bytes).await.unwrap();
        assert_invalid_table(&far).await;

        let mut bytes = test_image::build(true);
        bytes[slot + 32..slot + 40].copy_from_slice(&1u64.to_le_bytes());
        bytes[slot + 40..slot + 48].copy_from_slice(&(u64::MAX / 512).to_le_bytes());
        let wide = dir.path().join("wide.bin");
        tokio::fs::write(&wide, &bytes).await.unwrap();
        assert_invalid_table(&wide).await;
    }

    #[tokio::test]
    async fn oversized_entry_array_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();

        let mut bytes = test_image::build(true);
        bytes[512 + 80..512 + 84].copy_from_slice(&1024u32.to_le_bytes());
        bytes[512 + 84..512 + 88].copy_from_slice(&0xFFFF_FFF8u32.to_le_bytes());
        let image = dir.path().join("entries.bin");
        tokio::fs::write(&image, &bytes).await.unwrap();
        assert_invalid_table(&image).await;
    }

    #[tokio::test]
    async fn non_gpt_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("dlc.img");
        tokio::fs::write(&image, vec![0u8; 4096]).await.unwrap();

        let err = read_partition_table(&image).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Partition(PartitionError::InvalidPartitionTable { .. })
        ));
    }
}
