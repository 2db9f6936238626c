//! File handles and byte-level I/O over cluster chains.
//!
//! A handle caches the cluster containing its current position so
//! sequential access never re-walks the chain from the start. The cached
//! cluster deliberately lags at exact cluster boundaries: it still names
//! the cluster just read or written, and the next operation follows the
//! FAT link lazily. Seeks re-establish the same convention.

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::dir::{DirCursor, DirEntry};
use crate::error::{Fat32Error, Fat32Result};
use crate::fat::is_eoc;
use crate::fs::Fat32Fs;
use crate::name::{self, Attributes};

/// An open file or directory.
pub struct FileHandle {
    open: bool,
    attributes: Attributes,
    start_cluster: u32,
    current_cluster: u32,
    size: u32,
    position: u32,
    /// Location of the 8.3 record; sector 0 marks the root directory,
    /// which has no record to patch.
    dir_sector: u32,
    dir_offset: usize,
}

impl FileHandle {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn tell(&self) -> u32 {
        self.position
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.size
    }
}

impl<D: BlockDevice> Fat32Fs<D> {
    fn handle_from_entry(&mut self, entry: &DirEntry) -> Fat32Result<FileHandle> {
        let start_cluster = if entry.is_directory() {
            self.dir_cluster_or_root(entry.start_cluster)?
        } else {
            entry.start_cluster
        };
        Ok(FileHandle {
            open: true,
            attributes: entry.attributes,
            start_cluster,
            current_cluster: start_cluster,
            size: entry.size,
            position: 0,
            dir_sector: entry.sector,
            dir_offset: entry.offset,
        })
    }

    /// Open an existing file or directory.
    pub fn open(&mut self, path: &str) -> Fat32Result<FileHandle> {
        self.is_ready()?;
        let entry = self.find_entry(path)?;
        self.handle_from_entry(&entry)
    }

    /// Create a new empty file and open it. The file's first cluster is
    /// allocated immediately.
    pub fn create(&mut self, path: &str) -> Fat32Result<FileHandle> {
        self.is_ready()?;
        let (parent, leaf) = self.resolve_parent(path)?;
        let parent_cluster = self.dir_cluster_or_root(parent.start_cluster)?;
        if self.find_in_dir(parent_cluster, leaf)?.is_some() {
            return Err(Fat32Error::FileExists);
        }
        let entry = self.link_entry(parent_cluster, leaf, Attributes::ARCHIVE, 0, 0)?;
        self.handle_from_entry(&entry)
    }

    /// Close a handle. All data and metadata were persisted by the writes
    /// themselves, so this only invalidates the handle.
    pub fn close(&mut self, handle: &mut FileHandle) {
        handle.open = false;
    }

    /// Reposition a handle. Any position is legal, including past the end
    /// of file; nothing grows until a write lands there.
    pub fn seek(&mut self, handle: &mut FileHandle, position: u32) -> Fat32Result<()> {
        if !handle.open {
            return Err(Fat32Error::InvalidParameter);
        }
        self.is_ready()?;
        if handle.start_cluster >= 2 {
            let bpc = self.vol()?.bytes_per_cluster;
            // Lagging convention: a position on a cluster boundary maps to
            // the cluster before it. Past the end of file the walk stops
            // at the chain's last cluster; the next write extends it.
            let hops = if position == 0 { 0 } else { (position - 1) / bpc };
            let mut cluster = handle.start_cluster;
            for _ in 0..hops {
                let next = self.read_fat_entry(cluster)?;
                if is_eoc(next) {
                    break;
                }
                cluster = next;
            }
            handle.current_cluster = cluster;
        }
        handle.position = position;
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the current position. Returns the
    /// number of bytes read; 0 at end of file.
    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Fat32Result<usize> {
        if !handle.open {
            return Err(Fat32Error::InvalidParameter);
        }
        if handle.is_directory() {
            return Err(Fat32Error::NotAFile);
        }
        self.is_ready()?;

        let mut remaining = (handle.size.saturating_sub(handle.position) as usize).min(buf.len());
        if remaining == 0 {
            return Ok(0);
        }
        let bpc = self.vol()?.bytes_per_cluster;
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut done = 0;

        while remaining > 0 {
            if handle.position > 0 && handle.position % bpc == 0 {
                let next = self.read_fat_entry(handle.current_cluster)?;
                if is_eoc(next) {
                    break;
                }
                handle.current_cluster = next;
            }
            let in_cluster = handle.position % bpc;
            let sector = self.vol()?.cluster_to_sector(handle.current_cluster)
                + in_cluster / SECTOR_SIZE as u32;
            let in_sector = (handle.position % SECTOR_SIZE as u32) as usize;
            let chunk = (SECTOR_SIZE - in_sector).min(remaining);

            self.read_sector(sector, &mut sector_buf)?;
            buf[done..done + chunk].copy_from_slice(&sector_buf[in_sector..in_sector + chunk]);
            done += chunk;
            remaining -= chunk;
            handle.position += chunk as u32;
        }
        Ok(done)
    }

    /// Write `data` at the current position, growing the chain as needed.
    /// The position after the write becomes the file's size: writing mid
    /// file truncates whatever lay beyond, and the freed tail clusters are
    /// released.
    pub fn write(&mut self, handle: &mut FileHandle, data: &[u8]) -> Fat32Result<usize> {
        if !handle.open {
            return Err(Fat32Error::InvalidParameter);
        }
        if handle.is_directory() {
            return Err(Fat32Error::NotAFile);
        }
        self.is_ready()?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = (handle.position as u64)
            .checked_add(data.len() as u64)
            .filter(|&e| e <= u32::MAX as u64)
            .ok_or(Fat32Error::InvalidParameter)? as u32;

        // A file truncated to nothing has no chain; give it one back.
        if handle.start_cluster < 2 {
            handle.start_cluster = self.allocate_first_cluster()?;
            handle.current_cluster = handle.start_cluster;
        }

        let bpc = self.vol()?.bytes_per_cluster;

        // A position past the end of file may lie beyond the chain; walk
        // from the start and allocate the gap clusters up to it. Their
        // contents are whatever the disk held before.
        if handle.position > handle.size {
            let target = (handle.position - 1) / bpc;
            let mut cluster = handle.start_cluster;
            for _ in 0..target {
                let next = self.read_fat_entry(cluster)?;
                cluster = if is_eoc(next) {
                    self.allocate_and_link_cluster(cluster)?
                } else {
                    next
                };
            }
            handle.current_cluster = cluster;
        }

        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut done = 0;

        while done < data.len() {
            if handle.position > 0 && handle.position % bpc == 0 {
                let next = self.read_fat_entry(handle.current_cluster)?;
                handle.current_cluster = if is_eoc(next) {
                    self.allocate_and_link_cluster(handle.current_cluster)?
                } else {
                    next
                };
            }
            let in_cluster = handle.position % bpc;
            let sector = self.vol()?.cluster_to_sector(handle.current_cluster)
                + in_cluster / SECTOR_SIZE as u32;
            let in_sector = (handle.position % SECTOR_SIZE as u32) as usize;
            let chunk = (SECTOR_SIZE - in_sector).min(data.len() - done);

            if chunk == SECTOR_SIZE {
                sector_buf.copy_from_slice(&data[done..done + chunk]);
            } else {
                self.read_sector(sector, &mut sector_buf)?;
                sector_buf[in_sector..in_sector + chunk].copy_from_slice(&data[done..done + chunk]);
            }
            self.write_sector(sector, &sector_buf)?;
            done += chunk;
            handle.position += chunk as u32;
        }

        if end < handle.size {
            self.truncate_chain(handle.start_cluster, end)?;
        }
        handle.size = end;
        self.patch_record(handle)?;
        Ok(done)
    }

    /// Release the clusters past the one containing `end - 1` and
    /// terminate the chain there. `end` is at least 1; a write always
    /// keeps the first cluster.
    fn truncate_chain(&mut self, start_cluster: u32, end: u32) -> Fat32Result<()> {
        let bpc = self.vol()?.bytes_per_cluster;
        let last = self.seek_to_cluster(start_cluster, (end - 1) / bpc)?;
        let next = self.read_fat_entry(last)?;
        if !is_eoc(next) {
            self.write_fat_entry(last, crate::fat::EOC)?;
            self.release_cluster_chain(next)?;
        }
        Ok(())
    }

    /// Write the handle's size and start cluster back into its directory
    /// record.
    fn patch_record(&mut self, handle: &FileHandle) -> Fat32Result<()> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(handle.dir_sector, &mut buf)?;
        let rec = &mut buf[handle.dir_offset..handle.dir_offset + name::DIR_ENTRY_SIZE];
        name::record_set_size(rec, handle.size);
        name::record_set_cluster(rec, handle.start_cluster);
        self.write_sector(handle.dir_sector, &buf)
    }

    /// Read the next entry from a directory opened with [`open`](Self::open).
    /// `None` marks the end of the directory.
    pub fn read_dir(&mut self, handle: &mut FileHandle) -> Fat32Result<Option<DirEntry>> {
        if !handle.open {
            return Err(Fat32Error::InvalidParameter);
        }
        if !handle.is_directory() {
            return Err(Fat32Error::NotADirectory);
        }
        self.is_ready()?;

        let bpc = self.vol()?.bytes_per_cluster;
        let mut cursor = DirCursor::resume(handle.current_cluster, handle.position, bpc);
        let entry = self.next_dir_entry(&mut cursor)?;
        handle.current_cluster = cursor.cluster;
        handle.position = cursor.position;
        Ok(entry)
    }
}
