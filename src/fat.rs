//! FAT chain management: entry access, allocation, chain walking and
//! release, plus FSInfo hint maintenance.

use log::warn;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{Fat32Error, Fat32Result};
use crate::fs::Fat32Fs;
use crate::name::{read_u32, write_u32};

/// Only the low 28 bits of a FAT32 entry carry the cluster value; the top
/// four bits are reserved and must survive writes.
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
/// Entries at or above this value terminate a chain.
pub const EOC_MIN: u32 = 0x0FFF_FFF8;
/// The value written to terminate a chain.
pub const EOC: u32 = 0x0FFF_FFFF;
pub const FREE_CLUSTER: u32 = 0;

pub fn is_eoc(entry: u32) -> bool {
    entry >= EOC_MIN
}

impl<D: BlockDevice> Fat32Fs<D> {
    fn check_cluster(&self, cluster: u32) -> Fat32Result<()> {
        let vol = self.vol()?;
        if cluster < 2 || cluster >= vol.cluster_count + 2 {
            return Err(Fat32Error::InvalidParameter);
        }
        Ok(())
    }

    /// Read a FAT entry, masked to its 28 significant bits.
    pub(crate) fn read_fat_entry(&mut self, cluster: u32) -> Fat32Result<u32> {
        self.check_cluster(cluster)?;
        let vol = self.vol()?;
        let byte_offset = cluster * 4;
        let sector = vol.boot.reserved_sectors as u32 + byte_offset / SECTOR_SIZE as u32;
        let offset = (byte_offset % SECTOR_SIZE as u32) as usize;
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buf)?;
        Ok(read_u32(&buf, offset) & FAT_ENTRY_MASK)
    }

    /// Write a FAT entry, preserving the reserved top four bits and
    /// mirroring the change into every FAT copy.
    pub(crate) fn write_fat_entry(&mut self, cluster: u32, value: u32) -> Fat32Result<()> {
        self.check_cluster(cluster)?;
        let vol = self.vol()?;
        let byte_offset = cluster * 4;
        let sector_in_fat = byte_offset / SECTOR_SIZE as u32;
        let offset = (byte_offset % SECTOR_SIZE as u32) as usize;

        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(vol.boot.reserved_sectors as u32 + sector_in_fat, &mut buf)?;
        let preserved = read_u32(&buf, offset) & !FAT_ENTRY_MASK;
        write_u32(&mut buf, offset, preserved | (value & FAT_ENTRY_MASK));

        for copy in 0..vol.boot.num_fats as u32 {
            let sector =
                vol.boot.reserved_sectors as u32 + copy * vol.boot.fat_size_32 + sector_in_fat;
            self.write_sector(sector, &buf)?;
        }
        Ok(())
    }

    /// Find the next free cluster, scanning forward from the FSInfo hint
    /// and wrapping around once before giving up with `DiskFull`.
    pub(crate) fn next_free_cluster(&mut self) -> Fat32Result<u32> {
        let vol = self.vol()?;
        let max = vol.cluster_count + 2;
        let hint = vol.fsinfo.next_free;
        let start = if vol.fsinfo.next_free_known() && hint >= 2 && hint < max {
            hint
        } else {
            2
        };
        for cluster in (start..max).chain(2..start) {
            if self.read_fat_entry(cluster)? == FREE_CLUSTER {
                return Ok(cluster);
            }
        }
        Err(Fat32Error::DiskFull)
    }

    /// Allocate one cluster as the start of a new chain.
    pub(crate) fn allocate_first_cluster(&mut self) -> Fat32Result<u32> {
        let cluster = self.next_free_cluster()?;
        self.write_fat_entry(cluster, EOC)?;
        self.note_allocated(cluster)?;
        Ok(cluster)
    }

    /// Allocate one cluster and chain it after `last_cluster`.
    pub(crate) fn allocate_and_link_cluster(&mut self, last_cluster: u32) -> Fat32Result<u32> {
        let cluster = self.next_free_cluster()?;
        self.write_fat_entry(cluster, EOC)?;
        self.write_fat_entry(last_cluster, cluster)?;
        self.note_allocated(cluster)?;
        Ok(cluster)
    }

    fn note_allocated(&mut self, cluster: u32) -> Fat32Result<()> {
        let fsinfo = &mut self.vol_mut()?.fsinfo;
        if fsinfo.free_count_known() && fsinfo.free_count > 0 {
            fsinfo.free_count -= 1;
        }
        fsinfo.next_free = cluster + 1;
        self.persist_hints();
        Ok(())
    }

    /// Free an entire chain starting at `start_cluster`. A chain that runs
    /// into a free or out-of-range entry is treated as ended; releasing
    /// what was walked so far is the best that can be done.
    pub(crate) fn release_cluster_chain(&mut self, start_cluster: u32) -> Fat32Result<()> {
        let mut cluster = start_cluster;
        let mut freed: u32 = 0;
        let mut lowest = u32::MAX;
        let max = self.vol()?.cluster_count + 2;

        while cluster >= 2 && cluster < max {
            let next = self.read_fat_entry(cluster)?;
            self.write_fat_entry(cluster, FREE_CLUSTER)?;
            freed += 1;
            if cluster < lowest {
                lowest = cluster;
            }
            if is_eoc(next) || next == FREE_CLUSTER {
                break;
            }
            cluster = next;
        }

        if freed > 0 {
            let fsinfo = &mut self.vol_mut()?.fsinfo;
            if fsinfo.free_count_known() {
                fsinfo.free_count += freed;
            }
            if !fsinfo.next_free_known() || lowest < fsinfo.next_free {
                fsinfo.next_free = lowest;
            }
            self.persist_hints();
        }
        Ok(())
    }

    /// Zero every sector of a cluster.
    pub(crate) fn clear_cluster(&mut self, cluster: u32) -> Fat32Result<()> {
        self.check_cluster(cluster)?;
        let vol = self.vol()?;
        let first = vol.cluster_to_sector(cluster);
        let zeros = [0u8; SECTOR_SIZE];
        for s in 0..vol.boot.sectors_per_cluster as u32 {
            self.write_sector(first + s, &zeros)?;
        }
        Ok(())
    }

    /// Follow a chain `hops` links from `start_cluster`. Running off the
    /// end of the chain is an `InvalidPosition`.
    pub(crate) fn seek_to_cluster(&mut self, start_cluster: u32, hops: u32) -> Fat32Result<u32> {
        let mut cluster = start_cluster;
        for _ in 0..hops {
            let next = self.read_fat_entry(cluster)?;
            if is_eoc(next) {
                return Err(Fat32Error::InvalidPosition);
            }
            cluster = next;
        }
        Ok(cluster)
    }

    /// Count free clusters with a full FAT scan, one sector at a time.
    pub(crate) fn count_free_clusters(&mut self) -> Fat32Result<u32> {
        let vol = self.vol()?;
        let max = vol.cluster_count + 2;
        let fat_start = vol.boot.reserved_sectors as u32;
        let entries_per_sector = (SECTOR_SIZE / 4) as u32;

        let mut free: u32 = 0;
        let mut buf = [0u8; SECTOR_SIZE];
        let mut cached_sector = u32::MAX;
        for cluster in 2..max {
            let sector = fat_start + cluster / entries_per_sector;
            if sector != cached_sector {
                self.read_sector(sector, &mut buf)?;
                cached_sector = sector;
            }
            let offset = (cluster % entries_per_sector) as usize * 4;
            if read_u32(&buf, offset) & FAT_ENTRY_MASK == FREE_CLUSTER {
                free += 1;
            }
        }
        Ok(free)
    }

    /// Persist the FSInfo hints, degrading on failure: the operation that
    /// changed them has already landed in the FAT, so a failed writeback
    /// only costs hint accuracy. The stale hints are dropped and the next
    /// `free_space` call reconciles with a full scan.
    pub(crate) fn persist_hints(&mut self) {
        if let Err(e) = self.flush_fsinfo() {
            warn!("fat32: fsinfo writeback failed, hints dropped: {}", e);
            if let Ok(vol) = self.vol_mut() {
                vol.fsinfo.free_count = crate::volume::FSINFO_UNKNOWN;
                vol.fsinfo.next_free = crate::volume::FSINFO_UNKNOWN;
            }
        }
    }

    /// Write the cached hints back into the FSInfo sector. Skipped when
    /// the sector's signatures never verified.
    pub(crate) fn flush_fsinfo(&mut self) -> Fat32Result<()> {
        let vol = self.vol()?;
        if !vol.fsinfo.valid {
            return Ok(());
        }
        let sector = vol.boot.fsinfo_sector as u32;
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buf)?;
        vol.fsinfo.patch(&mut buf);
        self.write_sector(sector, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_disk;

    fn mounted() -> Fat32Fs<crate::testutil::MemDisk> {
        let mut fs = Fat32Fs::new(make_disk());
        fs.mount().unwrap();
        fs
    }

    #[test]
    fn root_chain_is_terminated() {
        let mut fs = mounted();
        let root = fs.vol().unwrap().boot.root_cluster;
        assert!(is_eoc(fs.read_fat_entry(root).unwrap()));
    }

    #[test]
    fn entry_bounds_are_enforced() {
        let mut fs = mounted();
        assert_eq!(fs.read_fat_entry(0), Err(Fat32Error::InvalidParameter));
        assert_eq!(fs.read_fat_entry(1), Err(Fat32Error::InvalidParameter));
        let max = fs.vol().unwrap().cluster_count + 2;
        assert_eq!(fs.read_fat_entry(max), Err(Fat32Error::InvalidParameter));
    }

    #[test]
    fn write_preserves_reserved_bits() {
        let mut fs = mounted();
        let cluster = fs.next_free_cluster().unwrap();

        // Plant reserved bits directly in the FAT.
        let vol = fs.vol().unwrap();
        let byte_offset = cluster * 4;
        let sector = vol.boot.reserved_sectors as u32 + byte_offset / SECTOR_SIZE as u32;
        let offset = (byte_offset % SECTOR_SIZE as u32) as usize;
        let mut buf = [0u8; SECTOR_SIZE];
        fs.read_sector(sector, &mut buf).unwrap();
        write_u32(&mut buf, offset, 0xA000_0000);
        fs.write_sector(sector, &buf).unwrap();

        fs.write_fat_entry(cluster, EOC).unwrap();
        fs.read_sector(sector, &mut buf).unwrap();
        assert_eq!(read_u32(&buf, offset), 0xA000_0000 | EOC);
        // The masked view hides them again.
        assert_eq!(fs.read_fat_entry(cluster).unwrap(), EOC);
    }

    #[test]
    fn writes_mirror_into_second_fat() {
        let mut fs = mounted();
        let cluster = fs.allocate_first_cluster().unwrap();
        let vol = fs.vol().unwrap();
        assert_eq!(vol.boot.num_fats, 2);

        let byte_offset = cluster * 4;
        let second_fat_sector = vol.boot.reserved_sectors as u32
            + vol.boot.fat_size_32
            + byte_offset / SECTOR_SIZE as u32;
        let offset = (byte_offset % SECTOR_SIZE as u32) as usize;
        let mut buf = [0u8; SECTOR_SIZE];
        fs.read_sector(second_fat_sector, &mut buf).unwrap();
        assert_eq!(read_u32(&buf, offset) & FAT_ENTRY_MASK, EOC);
    }

    #[test]
    fn allocate_link_and_release_round_trip() {
        let mut fs = mounted();
        let free_before = fs.count_free_clusters().unwrap();

        let first = fs.allocate_first_cluster().unwrap();
        let second = fs.allocate_and_link_cluster(first).unwrap();
        let third = fs.allocate_and_link_cluster(second).unwrap();
        assert_eq!(fs.read_fat_entry(first).unwrap(), second);
        assert_eq!(fs.read_fat_entry(second).unwrap(), third);
        assert!(is_eoc(fs.read_fat_entry(third).unwrap()));
        assert_eq!(fs.seek_to_cluster(first, 2).unwrap(), third);
        assert_eq!(fs.count_free_clusters().unwrap(), free_before - 3);

        fs.release_cluster_chain(first).unwrap();
        assert_eq!(fs.read_fat_entry(first).unwrap(), FREE_CLUSTER);
        assert_eq!(fs.read_fat_entry(second).unwrap(), FREE_CLUSTER);
        assert_eq!(fs.read_fat_entry(third).unwrap(), FREE_CLUSTER);
        assert_eq!(fs.count_free_clusters().unwrap(), free_before);
    }

    #[test]
    fn release_updates_hints() {
        let mut fs = mounted();
        let first = fs.allocate_first_cluster().unwrap();
        let second = fs.allocate_and_link_cluster(first).unwrap();
        assert!(second > first);
        // Allocation moved the hint past both clusters.
        assert!(fs.vol().unwrap().fsinfo.next_free > second);
        fs.release_cluster_chain(first).unwrap();
        assert_eq!(fs.vol().unwrap().fsinfo.next_free, first);
    }

    #[test]
    fn seek_within_and_past_chain() {
        let mut fs = mounted();
        let first = fs.allocate_first_cluster().unwrap();
        let second = fs.allocate_and_link_cluster(first).unwrap();
        assert_eq!(fs.seek_to_cluster(first, 0).unwrap(), first);
        assert_eq!(fs.seek_to_cluster(first, 1).unwrap(), second);
        assert_eq!(
            fs.seek_to_cluster(first, 2),
            Err(Fat32Error::InvalidPosition)
        );
    }

    #[test]
    fn clear_cluster_zeroes_all_sectors() {
        let mut fs = mounted();
        let cluster = fs.allocate_first_cluster().unwrap();
        let vol = fs.vol().unwrap();
        let first_sector = vol.cluster_to_sector(cluster);

        let filler = [0xAAu8; SECTOR_SIZE];
        for s in 0..vol.boot.sectors_per_cluster as u32 {
            fs.write_sector(first_sector + s, &filler).unwrap();
        }
        fs.clear_cluster(cluster).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        for s in 0..vol.boot.sectors_per_cluster as u32 {
            fs.read_sector(first_sector + s, &mut buf).unwrap();
            assert!(buf.iter().all(|&b| b == 0));
        }
    }
}
