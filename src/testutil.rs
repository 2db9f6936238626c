//! Test fixtures: an in-memory block device and disk images built with
//! the `fatfs` crate, which doubles as the reference implementation for
//! interoperability checks.

use std::io::{Cursor, Read, Write};

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::name;

/// RAM-backed block device with a removable-card switch and an optional
/// write fuse for fault-injection tests.
pub struct MemDisk {
    pub data: Vec<u8>,
    pub present: bool,
    /// `Some(n)` lets the next `n` writes through and fails the rest.
    pub writes_left: Option<u32>,
}

impl MemDisk {
    pub fn new(data: Vec<u8>) -> MemDisk {
        MemDisk {
            data,
            present: true,
            writes_left: None,
        }
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&mut self, block: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
        if !self.present {
            return false;
        }
        let offset = block as usize * SECTOR_SIZE;
        match self.data.get(offset..offset + SECTOR_SIZE) {
            Some(src) => {
                buf.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    fn write_block(&mut self, block: u32, buf: &[u8; SECTOR_SIZE]) -> bool {
        if !self.present {
            return false;
        }
        if let Some(left) = self.writes_left {
            if left == 0 {
                return false;
            }
            self.writes_left = Some(left - 1);
        }
        let offset = block as usize * SECTOR_SIZE;
        match self.data.get_mut(offset..offset + SECTOR_SIZE) {
            Some(dst) => {
                dst.copy_from_slice(buf);
                true
            }
            None => false,
        }
    }

    fn card_present(&self) -> bool {
        self.present
    }
}

/// A freshly formatted 64 MiB FAT32 volume with no partition table.
pub fn make_disk() -> MemDisk {
    const SIZE: usize = 64 * 1024 * 1024;
    let mut cursor = Cursor::new(vec![0u8; SIZE]);
    fatfs::format_volume(
        &mut cursor,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    )
    .expect("format_volume failed");
    MemDisk::new(cursor.into_inner())
}

/// A FAT16 volume, for negative mount tests.
pub fn fat16_disk() -> MemDisk {
    const SIZE: usize = 16 * 1024 * 1024;
    let mut cursor = Cursor::new(vec![0u8; SIZE]);
    fatfs::format_volume(
        &mut cursor,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat16),
    )
    .expect("format_volume failed");
    MemDisk::new(cursor.into_inner())
}

/// An MBR-partitioned disk whose single FAT32 partition starts at
/// `start_lba`.
pub fn partitioned_disk(start_lba: u32) -> MemDisk {
    let volume = make_disk();
    let offset = start_lba as usize * SECTOR_SIZE;
    let mut data = vec![0u8; offset + volume.data.len()];
    data[offset..].copy_from_slice(&volume.data);

    // Partition entry 1: inactive, type 0x0C (FAT32 LBA).
    let entry = 446;
    data[entry + 4] = 0x0C;
    data[entry + 8..entry + 12].copy_from_slice(&start_lba.to_le_bytes());
    data[510] = 0x55;
    data[511] = 0xAA;
    MemDisk::new(data)
}

/// A formatted volume containing one root-directory file written by the
/// reference driver.
pub fn disk_with_file(filename: &str, contents: &[u8]) -> MemDisk {
    let disk = make_disk();
    let mut cursor = Cursor::new(disk.data);
    {
        let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
            .expect("reference mount failed");
        let mut file = fs
            .root_dir()
            .create_file(filename)
            .expect("reference create failed");
        file.write_all(contents).expect("reference write failed");
    }
    MemDisk::new(cursor.into_inner())
}

/// A formatted volume carrying a volume-label record in its root
/// directory. The label is written raw; `fatfs` formatting only fills the
/// boot-sector label field.
pub fn labeled_disk(label: &[u8]) -> MemDisk {
    let mut disk = make_disk();

    // Locate the first root-directory sector from the boot sector.
    let mut boot = [0u8; SECTOR_SIZE];
    assert!(disk.read_block(0, &mut boot));
    let reserved = u16::from_le_bytes([boot[14], boot[15]]) as u32;
    let num_fats = boot[16] as u32;
    let fat_size = u32::from_le_bytes([boot[36], boot[37], boot[38], boot[39]]);
    let spc = boot[13] as u32;
    let root_cluster = u32::from_le_bytes([boot[44], boot[45], boot[46], boot[47]]);
    let root_sector = reserved + num_fats * fat_size + (root_cluster - 2) * spc;

    let mut short = [b' '; 11];
    short[..label.len()].copy_from_slice(label);
    let record = name::make_short_record(&short, name::Attributes::VOLUME_ID, 0, 0);

    let mut sector = [0u8; SECTOR_SIZE];
    assert!(disk.read_block(root_sector, &mut sector));
    sector[..name::DIR_ENTRY_SIZE].copy_from_slice(&record);
    assert!(disk.write_block(root_sector, &sector));
    disk
}

/// Root (or subdirectory) listing as seen by the reference driver.
pub fn read_via_fatfs(disk: &MemDisk, path: &str) -> Vec<String> {
    let cursor = Cursor::new(disk.data.clone());
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new())
        .expect("reference mount failed");
    let root = fs.root_dir();
    let entries: Vec<String> = if path == "/" {
        root.iter()
            .map(|e| e.expect("reference iter failed").file_name())
            .collect()
    } else {
        root.open_dir(path)
            .expect("reference open_dir failed")
            .iter()
            .map(|e| e.expect("reference iter failed").file_name())
            .collect()
    };
    entries
}

/// File contents as seen by the reference driver.
pub fn read_file_via_fatfs(disk: &MemDisk, filename: &str) -> Vec<u8> {
    let cursor = Cursor::new(disk.data.clone());
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new())
        .expect("reference mount failed");
    let mut file = fs
        .root_dir()
        .open_file(filename)
        .expect("reference open failed");
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).expect("reference read failed");
    contents
}
