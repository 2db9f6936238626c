//! The filesystem engine: device ownership, mount lifecycle and raw
//! sector access. FAT-chain, directory and file operations live in their
//! own modules as further `impl` blocks on [`Fat32Fs`].

use log::{debug, warn};

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{Fat32Error, Fat32Result};
use crate::volume::{self, BootSector, FsInfo, Volume};

/// A FAT32 filesystem bound to a block device.
///
/// All state lives here; there are no globals. The engine owns the device
/// exclusively, so every operation takes `&mut self` and works through
/// per-call sector buffers on the stack.
pub struct Fat32Fs<D: BlockDevice> {
    pub(crate) dev: D,
    pub(crate) vol: Option<Volume>,
    mount_status: Fat32Result<()>,
}

impl<D: BlockDevice> Fat32Fs<D> {
    /// Wrap a device without touching it. Call [`mount`](Self::mount) (or
    /// any operation via [`is_ready`](Self::is_ready)) before use.
    pub fn new(dev: D) -> Fat32Fs<D> {
        Fat32Fs {
            dev,
            vol: None,
            mount_status: Err(Fat32Error::NotMounted),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.vol.is_some()
    }

    /// Outcome of the most recent mount attempt.
    pub fn status(&self) -> Fat32Result<()> {
        self.mount_status
    }

    /// Drop the mounted volume. Cached FSInfo hints are written back first
    /// when possible; failure to do so only costs the next mount a rescan.
    pub fn unmount(&mut self) {
        if self.vol.is_some() {
            if let Err(e) = self.flush_fsinfo() {
                warn!("fat32: fsinfo writeback failed on unmount: {}", e);
            }
        }
        self.vol = None;
        self.mount_status = Err(Fat32Error::NotMounted);
    }

    /// Probe and mount the volume: locate the boot sector (directly at
    /// block 0, or via the first FAT32 entry of an MBR), validate it, and
    /// cache geometry plus FSInfo hints. Already mounted is a no-op.
    pub fn mount(&mut self) -> Fat32Result<()> {
        if self.vol.is_some() {
            return Ok(());
        }
        self.mount_status = self.mount_inner();
        self.mount_status
    }

    fn mount_inner(&mut self) -> Fat32Result<()> {
        if !self.dev.card_present() {
            return Err(Fat32Error::NoCard);
        }

        let mut sector = [0u8; SECTOR_SIZE];
        if !self.dev.read_block(0, &mut sector) {
            return Err(Fat32Error::ReadFailed);
        }

        let start_block = if volume::is_boot_sector(&sector) {
            0
        } else if volume::is_mbr(&sector) {
            let lba = volume::find_fat32_partition(&sector).ok_or(Fat32Error::InvalidFormat)?;
            if !self.dev.read_block(lba, &mut sector) {
                return Err(Fat32Error::ReadFailed);
            }
            if !volume::is_boot_sector(&sector) {
                return Err(Fat32Error::InvalidFormat);
            }
            lba
        } else {
            return Err(Fat32Error::InvalidFormat);
        };

        let boot = BootSector::parse(&sector)?;
        let mut vol = Volume::from_boot_sector(start_block, boot)?;

        // FSInfo is advisory: unreachable or malformed hints degrade to a
        // full FAT scan later, they never fail the mount.
        if boot.fsinfo_sector != 0 && boot.fsinfo_sector < boot.reserved_sectors {
            let fsinfo_block = start_block + boot.fsinfo_sector as u32;
            if self.dev.read_block(fsinfo_block, &mut sector) {
                vol.fsinfo = FsInfo::parse(&sector);
                if !vol.fsinfo.valid {
                    warn!("fat32: fsinfo signatures invalid, hints disabled");
                }
            } else {
                warn!("fat32: fsinfo sector unreadable, hints disabled");
            }
        }

        debug!(
            "fat32: mounted, {} clusters of {} bytes at block {}",
            vol.cluster_count, vol.bytes_per_cluster, start_block
        );
        self.vol = Some(vol);
        Ok(())
    }

    /// Ensure the device is present and a volume is mounted, remounting
    /// lazily after a card swap. A missing card force-unmounts so stale
    /// geometry can never be used against a different card.
    pub fn is_ready(&mut self) -> Fat32Result<()> {
        if !self.dev.card_present() {
            if self.vol.take().is_some() {
                warn!("fat32: card removed, volume unmounted");
            }
            self.mount_status = Err(Fat32Error::NoCard);
            return Err(Fat32Error::NoCard);
        }
        if self.vol.is_none() {
            self.mount()?;
        }
        Ok(())
    }

    /// Total volume capacity in bytes.
    pub fn total_space(&self) -> Fat32Result<u64> {
        let vol = self.vol()?;
        Ok(vol.boot.total_sectors_32 as u64 * SECTOR_SIZE as u64)
    }

    /// Free capacity in bytes. Uses the FSInfo free-count hint when it is
    /// plausible; otherwise scans the FAT, then caches the result.
    pub fn free_space(&mut self) -> Fat32Result<u64> {
        self.is_ready()?;
        let vol = self.vol()?;
        let free = if vol.fsinfo.free_count_known() && vol.fsinfo.free_count <= vol.cluster_count {
            vol.fsinfo.free_count
        } else {
            let counted = self.count_free_clusters()?;
            self.vol_mut()?.fsinfo.free_count = counted;
            self.persist_hints();
            counted
        };
        Ok(free as u64 * self.vol()?.bytes_per_cluster as u64)
    }

    pub fn cluster_size(&self) -> Fat32Result<u32> {
        Ok(self.vol()?.bytes_per_cluster)
    }

    // ─── internal helpers ────────────────────────────────────────────────

    pub(crate) fn vol(&self) -> Fat32Result<Volume> {
        self.vol.ok_or(Fat32Error::NotMounted)
    }

    pub(crate) fn vol_mut(&mut self) -> Fat32Result<&mut Volume> {
        self.vol.as_mut().ok_or(Fat32Error::NotMounted)
    }

    /// Read a volume-relative sector.
    pub(crate) fn read_sector(
        &mut self,
        sector: u32,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Fat32Result<()> {
        let base = self.vol()?.start_block;
        if self.dev.read_block(base + sector, buf) {
            Ok(())
        } else {
            Err(Fat32Error::ReadFailed)
        }
    }

    /// Write a volume-relative sector.
    pub(crate) fn write_sector(&mut self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Fat32Result<()> {
        let base = self.vol()?.start_block;
        if self.dev.write_block(base + sector, buf) {
            Ok(())
        } else {
            Err(Fat32Error::WriteFailed)
        }
    }
}
