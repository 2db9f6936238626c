//! Boot-sector, FSInfo and MBR parsing.
//!
//! All on-disk fields are decoded from explicit little-endian byte offsets;
//! nothing here overlays structs onto raw buffers. Validation is strict:
//! anything that is not a well-formed FAT32 volume is rejected with
//! `InvalidFormat` before the engine caches any geometry.

use crate::device::SECTOR_SIZE;
use crate::error::{Fat32Error, Fat32Result};
use crate::name::{read_u16, read_u32, write_u32};

// Boot-sector field offsets.
const BS_JUMP: usize = 0;
const BS_BYTES_PER_SECTOR: usize = 11;
const BS_SECTORS_PER_CLUSTER: usize = 13;
const BS_RESERVED_SECTORS: usize = 14;
const BS_NUM_FATS: usize = 16;
const BS_FAT_SIZE_16: usize = 22;
const BS_TOTAL_SECTORS_32: usize = 32;
const BS_FAT_SIZE_32: usize = 36;
const BS_ROOT_CLUSTER: usize = 44;
const BS_FSINFO_SECTOR: usize = 48;
const BS_SIGNATURE: usize = 510;

// MBR layout.
const MBR_PART_TABLE: usize = 446;
const MBR_PART_ENTRY_SIZE: usize = 16;
const PART_BOOT_INDICATOR: usize = 0;
const PART_TYPE: usize = 4;
const PART_START_LBA: usize = 8;

// FSInfo field offsets and signatures.
const FSI_LEAD_SIG: usize = 0;
const FSI_STRUC_SIG: usize = 484;
const FSI_FREE_COUNT: usize = 488;
const FSI_NEXT_FREE: usize = 492;
const FSI_TRAIL_SIG: usize = 508;
const FSI_LEAD_VALUE: u32 = 0x4161_5252;
const FSI_STRUC_VALUE: u32 = 0x6141_7272;
const FSI_TRAIL_VALUE: u32 = 0xAA55_0000;

/// Free-count / next-free hint value meaning "unknown".
pub const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

fn has_boot_signature(sector: &[u8; SECTOR_SIZE]) -> bool {
    sector[BS_SIGNATURE] == 0x55 && sector[BS_SIGNATURE + 1] == 0xAA
}

/// A sector is treated as an MBR when it carries the boot signature and at
/// least one partition entry with a nonzero type.
pub fn is_mbr(sector: &[u8; SECTOR_SIZE]) -> bool {
    if !has_boot_signature(sector) {
        return false;
    }
    (0..4).any(|i| sector[MBR_PART_TABLE + i * MBR_PART_ENTRY_SIZE + PART_TYPE] != 0)
}

/// A sector looks like a FAT boot sector when it carries the boot
/// signature, a jump instruction, and a plausible bytes-per-sector value.
pub fn is_boot_sector(sector: &[u8; SECTOR_SIZE]) -> bool {
    if !has_boot_signature(sector) {
        return false;
    }
    if sector[BS_JUMP] != 0xEB && sector[BS_JUMP] != 0xE9 {
        return false;
    }
    matches!(read_u16(sector, BS_BYTES_PER_SECTOR), 512 | 1024 | 2048 | 4096)
}

/// Scan the four MBR partition entries for a FAT32 partition (type 0x0B
/// CHS or 0x0C LBA) and return its start LBA.
pub fn find_fat32_partition(sector: &[u8; SECTOR_SIZE]) -> Option<u32> {
    for i in 0..4 {
        let entry = &sector[MBR_PART_TABLE + i * MBR_PART_ENTRY_SIZE..];
        let boot_indicator = entry[PART_BOOT_INDICATOR];
        if boot_indicator != 0x00 && boot_indicator != 0x80 {
            continue;
        }
        let part_type = entry[PART_TYPE];
        if part_type == 0x0B || part_type == 0x0C {
            return Some(read_u32(entry, PART_START_LBA));
        }
    }
    None
}

/// Cached boot-sector fields we actually use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub fat_size_32: u32,
    pub total_sectors_32: u32,
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
}

impl BootSector {
    /// Decode and validate. The fat_size_16 check is what distinguishes
    /// FAT32 from FAT12/16 at this stage; the cluster-count check happens
    /// later, once geometry is derived.
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> Fat32Result<BootSector> {
        let bs = BootSector {
            bytes_per_sector: read_u16(sector, BS_BYTES_PER_SECTOR),
            sectors_per_cluster: sector[BS_SECTORS_PER_CLUSTER],
            reserved_sectors: read_u16(sector, BS_RESERVED_SECTORS),
            num_fats: sector[BS_NUM_FATS],
            fat_size_32: read_u32(sector, BS_FAT_SIZE_32),
            total_sectors_32: read_u32(sector, BS_TOTAL_SECTORS_32),
            root_cluster: read_u32(sector, BS_ROOT_CLUSTER),
            fsinfo_sector: read_u16(sector, BS_FSINFO_SECTOR),
        };

        if bs.bytes_per_sector as usize != SECTOR_SIZE {
            return Err(Fat32Error::InvalidFormat);
        }
        let spc = bs.sectors_per_cluster;
        if spc == 0 || spc > 128 || !spc.is_power_of_two() {
            return Err(Fat32Error::InvalidFormat);
        }
        if bs.num_fats == 0 || bs.num_fats > 2 {
            return Err(Fat32Error::InvalidFormat);
        }
        if bs.reserved_sectors == 0 {
            return Err(Fat32Error::InvalidFormat);
        }
        if read_u16(sector, BS_FAT_SIZE_16) != 0 || bs.fat_size_32 == 0 {
            return Err(Fat32Error::InvalidFormat);
        }
        if bs.total_sectors_32 == 0 {
            return Err(Fat32Error::InvalidFormat);
        }
        Ok(bs)
    }
}

/// FSInfo hints. These are advisory: either may be the unknown sentinel,
/// and a volume whose FSInfo signatures do not verify keeps `valid` false
/// so the engine never writes the sector back.
#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    pub free_count: u32,
    pub next_free: u32,
    /// All three signatures verified at mount time.
    pub valid: bool,
}

impl FsInfo {
    pub fn unknown() -> FsInfo {
        FsInfo {
            free_count: FSINFO_UNKNOWN,
            next_free: FSINFO_UNKNOWN,
            valid: false,
        }
    }

    /// Decode the FSInfo sector. Bad signatures yield the unknown hints
    /// rather than an error; the mount proceeds without them.
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> FsInfo {
        if read_u32(sector, FSI_LEAD_SIG) != FSI_LEAD_VALUE
            || read_u32(sector, FSI_STRUC_SIG) != FSI_STRUC_VALUE
            || read_u32(sector, FSI_TRAIL_SIG) != FSI_TRAIL_VALUE
        {
            return FsInfo::unknown();
        }
        FsInfo {
            free_count: read_u32(sector, FSI_FREE_COUNT),
            next_free: read_u32(sector, FSI_NEXT_FREE),
            valid: true,
        }
    }

    /// Patch the hint fields into a previously read FSInfo sector image.
    pub fn patch(&self, sector: &mut [u8; SECTOR_SIZE]) {
        write_u32(sector, FSI_FREE_COUNT, self.free_count);
        write_u32(sector, FSI_NEXT_FREE, self.next_free);
    }

    pub fn free_count_known(&self) -> bool {
        self.free_count != FSINFO_UNKNOWN
    }

    pub fn next_free_known(&self) -> bool {
        self.next_free != FSINFO_UNKNOWN
    }
}

/// Everything the engine needs to know about a mounted volume: validated
/// boot-sector fields, derived geometry, FSInfo hints and the current
/// directory. One of these exists per mounted card, owned by the engine.
#[derive(Debug, Clone, Copy)]
pub struct Volume {
    /// First physical block of the volume (partition offset; 0 when the
    /// whole device is one volume).
    pub start_block: u32,
    pub boot: BootSector,
    pub first_data_sector: u32,
    pub cluster_count: u32,
    pub bytes_per_cluster: u32,
    pub fsinfo: FsInfo,
    pub current_dir_cluster: u32,
}

impl Volume {
    /// Derive geometry from a validated boot sector. Rejects volumes whose
    /// cluster count is below the FAT32 minimum (those are FAT12/16 even
    /// when the boot sector uses 32-bit fields).
    pub fn from_boot_sector(start_block: u32, boot: BootSector) -> Fat32Result<Volume> {
        let fat_sectors = boot.num_fats as u32 * boot.fat_size_32;
        let first_data_sector = boot.reserved_sectors as u32 + fat_sectors;
        let data_region_sectors = boot.total_sectors_32 - first_data_sector;
        let cluster_count = data_region_sectors / boot.sectors_per_cluster as u32;
        if cluster_count < 65525 {
            return Err(Fat32Error::InvalidFormat);
        }
        Ok(Volume {
            start_block,
            boot,
            first_data_sector,
            cluster_count,
            bytes_per_cluster: boot.sectors_per_cluster as u32 * SECTOR_SIZE as u32,
            fsinfo: FsInfo::unknown(),
            current_dir_cluster: boot.root_cluster,
        })
    }

    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        (cluster - 2) * self.boot.sectors_per_cluster as u32 + self.first_data_sector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::write_u16;

    fn minimal_boot_sector() -> [u8; SECTOR_SIZE] {
        let mut s = [0u8; SECTOR_SIZE];
        s[BS_JUMP] = 0xEB;
        write_u16(&mut s, BS_BYTES_PER_SECTOR, 512);
        s[BS_SECTORS_PER_CLUSTER] = 8;
        write_u16(&mut s, BS_RESERVED_SECTORS, 32);
        s[BS_NUM_FATS] = 2;
        write_u32(&mut s, BS_TOTAL_SECTORS_32, 1_000_000);
        write_u32(&mut s, BS_FAT_SIZE_32, 970);
        write_u32(&mut s, BS_ROOT_CLUSTER, 2);
        write_u16(&mut s, BS_FSINFO_SECTOR, 1);
        s[BS_SIGNATURE] = 0x55;
        s[BS_SIGNATURE + 1] = 0xAA;
        s
    }

    #[test]
    fn parse_valid_boot_sector() {
        let bs = BootSector::parse(&minimal_boot_sector()).unwrap();
        assert_eq!(bs.bytes_per_sector, 512);
        assert_eq!(bs.sectors_per_cluster, 8);
        assert_eq!(bs.num_fats, 2);
        assert_eq!(bs.root_cluster, 2);
        assert_eq!(bs.fsinfo_sector, 1);
    }

    #[test]
    fn reject_nonzero_fat_size_16() {
        // fat_size_16 != 0 means FAT12/16.
        let mut s = minimal_boot_sector();
        write_u16(&mut s, BS_FAT_SIZE_16, 200);
        assert_eq!(BootSector::parse(&s), Err(Fat32Error::InvalidFormat));
    }

    #[test]
    fn reject_bad_sectors_per_cluster() {
        for bad in [0u8, 3, 129, 255] {
            let mut s = minimal_boot_sector();
            s[BS_SECTORS_PER_CLUSTER] = bad;
            assert_eq!(BootSector::parse(&s), Err(Fat32Error::InvalidFormat));
        }
    }

    #[test]
    fn reject_bad_fat_count() {
        for bad in [0u8, 3] {
            let mut s = minimal_boot_sector();
            s[BS_NUM_FATS] = bad;
            assert_eq!(BootSector::parse(&s), Err(Fat32Error::InvalidFormat));
        }
    }

    #[test]
    fn reject_zero_reserved_sectors() {
        let mut s = minimal_boot_sector();
        write_u16(&mut s, BS_RESERVED_SECTORS, 0);
        assert_eq!(BootSector::parse(&s), Err(Fat32Error::InvalidFormat));
    }

    #[test]
    fn reject_wrong_sector_size() {
        let mut s = minimal_boot_sector();
        write_u16(&mut s, BS_BYTES_PER_SECTOR, 1024);
        assert_eq!(BootSector::parse(&s), Err(Fat32Error::InvalidFormat));
    }

    #[test]
    fn boot_sector_probe() {
        let s = minimal_boot_sector();
        assert!(is_boot_sector(&s));
        let mut no_jump = s;
        no_jump[BS_JUMP] = 0x00;
        assert!(!is_boot_sector(&no_jump));
        let mut no_sig = s;
        no_sig[BS_SIGNATURE] = 0;
        assert!(!is_boot_sector(&no_sig));
    }

    #[test]
    fn mbr_probe_and_partition_scan() {
        let mut s = [0u8; SECTOR_SIZE];
        s[BS_SIGNATURE] = 0x55;
        s[BS_SIGNATURE + 1] = 0xAA;
        assert!(!is_mbr(&s)); // no partitions

        // Entry 0: non-FAT type. Entry 1: FAT32 LBA at block 2048.
        s[MBR_PART_TABLE + PART_TYPE] = 0x83;
        let e1 = MBR_PART_TABLE + MBR_PART_ENTRY_SIZE;
        s[e1 + PART_BOOT_INDICATOR] = 0x80;
        s[e1 + PART_TYPE] = 0x0C;
        write_u32(&mut s, e1 + PART_START_LBA, 2048);
        assert!(is_mbr(&s));
        assert_eq!(find_fat32_partition(&s), Some(2048));
    }

    #[test]
    fn partition_scan_ignores_bad_boot_indicator() {
        let mut s = [0u8; SECTOR_SIZE];
        s[BS_SIGNATURE] = 0x55;
        s[BS_SIGNATURE + 1] = 0xAA;
        s[MBR_PART_TABLE + PART_BOOT_INDICATOR] = 0x55; // garbage
        s[MBR_PART_TABLE + PART_TYPE] = 0x0C;
        assert_eq!(find_fat32_partition(&s), None);
    }

    #[test]
    fn fsinfo_parse_and_patch() {
        let mut s = [0u8; SECTOR_SIZE];
        write_u32(&mut s, FSI_LEAD_SIG, FSI_LEAD_VALUE);
        write_u32(&mut s, FSI_STRUC_SIG, FSI_STRUC_VALUE);
        write_u32(&mut s, FSI_TRAIL_SIG, FSI_TRAIL_VALUE);
        write_u32(&mut s, FSI_FREE_COUNT, 12345);
        write_u32(&mut s, FSI_NEXT_FREE, 77);

        let mut info = FsInfo::parse(&s);
        assert!(info.valid);
        assert_eq!(info.free_count, 12345);
        assert_eq!(info.next_free, 77);

        info.free_count = 12344;
        info.patch(&mut s);
        assert_eq!(read_u32(&s, FSI_FREE_COUNT), 12344);
        assert_eq!(read_u32(&s, FSI_TRAIL_SIG), FSI_TRAIL_VALUE);
    }

    #[test]
    fn fsinfo_bad_signature_degrades_to_unknown() {
        let s = [0u8; SECTOR_SIZE];
        let info = FsInfo::parse(&s);
        assert!(!info.valid);
        assert!(!info.free_count_known());
        assert!(!info.next_free_known());
    }

    #[test]
    fn geometry_rejects_small_cluster_count() {
        let mut raw = minimal_boot_sector();
        // Shrink the volume until the cluster count is FAT16-sized.
        write_u32(&mut raw, BS_TOTAL_SECTORS_32, 60_000);
        write_u32(&mut raw, BS_FAT_SIZE_32, 60);
        let bs = BootSector::parse(&raw).unwrap();
        assert_eq!(
            Volume::from_boot_sector(0, bs).err(),
            Some(Fat32Error::InvalidFormat)
        );
    }

    #[test]
    fn geometry_derivation() {
        let bs = BootSector::parse(&minimal_boot_sector()).unwrap();
        let vol = Volume::from_boot_sector(0, bs).unwrap();
        assert_eq!(vol.first_data_sector, 32 + 2 * 970);
        assert_eq!(vol.bytes_per_cluster, 4096);
        assert_eq!(vol.cluster_to_sector(2), vol.first_data_sector);
        assert_eq!(vol.cluster_to_sector(3), vol.first_data_sector + 8);
        assert_eq!(vol.current_dir_cluster, 2);
    }
}
