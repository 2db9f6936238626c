//! Directory operations: entry iteration with long-name assembly, path
//! resolution, entry creation and removal, directory creation and the
//! current-directory tracking built on top of them.

use log::debug;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{Fat32Error, Fat32Result};
use crate::fat::is_eoc;
use crate::fs::Fat32Fs;
use crate::name::{
    self, Attributes, DIR_ENTRY_END, DIR_ENTRY_FREE, DIR_ENTRY_SIZE, LfnAssembler,
    MAX_FILENAME_LEN, MAX_PATH_LEN, SanitizedName,
};

/// Deepest directory nesting the current-directory walk will follow.
pub const MAX_DIR_DEPTH: usize = 16;

/// One resolved directory entry: either a file or a subdirectory, with
/// enough location to patch its on-disk record later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry {
    name_buf: [u8; MAX_FILENAME_LEN],
    name_len: usize,
    pub(crate) short_name: [u8; 11],
    pub attributes: Attributes,
    pub size: u32,
    pub start_cluster: u32,
    /// Volume-relative sector holding the 8.3 record; 0 marks the
    /// synthetic root entry, which has no record on disk.
    pub(crate) sector: u32,
    pub(crate) offset: usize,
}

impl DirEntry {
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name_buf[..self.name_len]).unwrap_or("")
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }

    pub(crate) fn is_root(&self) -> bool {
        self.sector == 0
    }

    fn from_name_bytes(bytes: &[u8]) -> ([u8; MAX_FILENAME_LEN], usize) {
        let mut buf = [0u8; MAX_FILENAME_LEN];
        let len = bytes.len().min(MAX_FILENAME_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        (buf, len)
    }

    fn root(root_cluster: u32) -> DirEntry {
        let (name_buf, name_len) = DirEntry::from_name_bytes(b"/");
        DirEntry {
            name_buf,
            name_len,
            short_name: [b' '; 11],
            attributes: Attributes::DIRECTORY,
            size: 0,
            start_cluster: root_cluster,
            sector: 0,
            offset: 0,
        }
    }

    fn matches(&self, component: &str) -> bool {
        if self.name().eq_ignore_ascii_case(component) {
            return true;
        }
        // A long-named entry is still reachable by its 8.3 alias.
        let (short, len) = name::filename_from_short_name(&self.short_name);
        component.as_bytes().eq_ignore_ascii_case(&short[..len])
    }
}

/// Byte-position cursor over one directory's cluster chain. Valid only
/// when advanced record by record from position 0.
pub(crate) struct DirCursor {
    pub cluster: u32,
    pub position: u32,
    /// Byte position of the first record in `cluster`.
    cluster_base: u32,
}

impl DirCursor {
    pub fn new(start_cluster: u32) -> DirCursor {
        DirCursor {
            cluster: start_cluster,
            position: 0,
            cluster_base: 0,
        }
    }

    /// Rebuild a cursor from a handle's cached cluster and position. The
    /// cache lags at exact cluster boundaries, so the base is the start of
    /// the cluster containing `position - 1`.
    pub fn resume(cluster: u32, position: u32, bytes_per_cluster: u32) -> DirCursor {
        let base = if position == 0 {
            0
        } else {
            ((position - 1) / bytes_per_cluster) * bytes_per_cluster
        };
        DirCursor {
            cluster,
            position,
            cluster_base: base,
        }
    }
}

impl<D: BlockDevice> Fat32Fs<D> {
    /// Map a cluster field to a directory start cluster. Zero is the FAT
    /// convention for "root" in `..` entries.
    pub(crate) fn dir_cluster_or_root(&self, cluster: u32) -> Fat32Result<u32> {
        let root = self.vol()?.boot.root_cluster;
        Ok(if cluster == 0 { root } else { cluster })
    }

    /// Volume-relative sector and byte offset of the record the cursor
    /// points at, or `None` when the cursor ran off the chain.
    fn cursor_slot(&mut self, cursor: &mut DirCursor) -> Fat32Result<Option<(u32, usize)>> {
        let vol = self.vol()?;
        let bpc = vol.bytes_per_cluster;
        if cursor.position - cursor.cluster_base == bpc {
            let next = self.read_fat_entry(cursor.cluster)?;
            if is_eoc(next) {
                return Ok(None);
            }
            cursor.cluster = next;
            cursor.cluster_base = cursor.position;
        }
        let in_cluster = cursor.position - cursor.cluster_base;
        let sector = vol.cluster_to_sector(cursor.cluster) + in_cluster / SECTOR_SIZE as u32;
        Ok(Some((sector, (in_cluster as usize) % SECTOR_SIZE)))
    }

    /// Read the next live entry from a directory, assembling any long-name
    /// fragments that immediately precede its short record. `None` means
    /// the end of the directory.
    pub(crate) fn next_dir_entry(
        &mut self,
        cursor: &mut DirCursor,
    ) -> Fat32Result<Option<DirEntry>> {
        let mut asm = LfnAssembler::new();
        let mut buf = [0u8; SECTOR_SIZE];
        let mut cached_sector = u32::MAX;

        loop {
            let (sector, offset) = match self.cursor_slot(cursor)? {
                Some(slot) => slot,
                None => return Ok(None),
            };
            if sector != cached_sector {
                self.read_sector(sector, &mut buf)?;
                cached_sector = sector;
            }
            let rec = &buf[offset..offset + DIR_ENTRY_SIZE];
            let first = name::record_first_byte(rec);

            if first == DIR_ENTRY_END {
                return Ok(None);
            }
            cursor.position += DIR_ENTRY_SIZE as u32;

            if first == DIR_ENTRY_FREE {
                asm.reset();
                continue;
            }
            if name::record_is_lfn(rec) {
                asm.push_fragment(rec);
                continue;
            }
            let attributes = Attributes::from_bits_truncate(name::record_attr(rec));
            if attributes.is_volume_id() {
                asm.reset();
                continue;
            }

            let short_name = name::record_short_name(rec);
            let checksum = name::short_name_checksum(&short_name);
            let (name_buf, name_len) = match asm.take_for(checksum) {
                Some((long, len)) => (long, len),
                None => {
                    let (decoded, len) = name::filename_from_short_name(&short_name);
                    DirEntry::from_name_bytes(&decoded[..len])
                }
            };
            return Ok(Some(DirEntry {
                name_buf,
                name_len,
                short_name,
                attributes,
                size: name::record_size(rec),
                start_cluster: name::record_cluster(rec),
                sector,
                offset,
            }));
        }
    }

    /// Scan one directory for a component by long or short name.
    pub(crate) fn find_in_dir(
        &mut self,
        dir_cluster: u32,
        component: &str,
    ) -> Fat32Result<Option<DirEntry>> {
        let mut cursor = DirCursor::new(dir_cluster);
        while let Some(entry) = self.next_dir_entry(&mut cursor)? {
            if entry.matches(component) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Resolve a path to its directory entry. Absolute paths start at the
    /// root, relative ones at the current directory. `/`, the empty path,
    /// and `.`/`..` at the root all resolve to the synthetic root entry.
    pub fn find_entry(&mut self, path: &str) -> Fat32Result<DirEntry> {
        self.is_ready()?;
        if path.len() > MAX_PATH_LEN {
            return Err(Fat32Error::InvalidPath);
        }
        let vol = self.vol()?;
        let root = vol.boot.root_cluster;
        let start = if path.starts_with('/') {
            root
        } else {
            vol.current_dir_cluster
        };

        let mut current = if start == root {
            DirEntry::root(root)
        } else {
            // Synthesize a handle-less entry for the current directory;
            // only its cluster matters for the walk.
            let mut entry = DirEntry::root(root);
            entry.start_cluster = start;
            entry
        };

        let mut parts = path.split('/').filter(|p| !p.is_empty()).peekable();
        while let Some(component) = parts.next() {
            if !current.is_directory() {
                return Err(Fat32Error::DirNotFound);
            }
            if component == "." {
                continue;
            }
            let dir_cluster = self.dir_cluster_or_root(current.start_cluster)?;
            if component == ".." && dir_cluster == root {
                // The root has no `..` entry; going up stays at the root.
                current = DirEntry::root(root);
                continue;
            }
            match self.find_in_dir(dir_cluster, component)? {
                Some(entry) => current = entry,
                None => {
                    // Missing intermediates and missing leaves are
                    // distinct failures.
                    return Err(if parts.peek().is_some() {
                        Fat32Error::DirNotFound
                    } else {
                        Fat32Error::FileNotFound
                    });
                }
            }
        }
        Ok(current)
    }

    /// Split a path into its parent directory entry and final component.
    pub(crate) fn resolve_parent<'p>(&mut self, path: &'p str) -> Fat32Result<(DirEntry, &'p str)> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Fat32Error::InvalidPath);
        }
        let (parent_path, leaf) = match trimmed.rfind('/') {
            Some(0) => ("/", &trimmed[1..]),
            Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
            None => ("", trimmed),
        };
        if leaf.is_empty() || leaf == "." || leaf == ".." {
            return Err(Fat32Error::InvalidPath);
        }
        let parent = self.find_entry(parent_path)?;
        if !parent.is_directory() {
            return Err(Fat32Error::DirNotFound);
        }
        Ok((parent, leaf))
    }

    // ─── Entry creation ──────────────────────────────────────────────────

    /// Whether a raw 11-byte short name is already taken in a directory.
    fn short_name_exists(&mut self, dir_cluster: u32, short: &[u8; 11]) -> Fat32Result<bool> {
        let mut cursor = DirCursor::new(dir_cluster);
        let mut buf = [0u8; SECTOR_SIZE];
        let mut cached_sector = u32::MAX;
        loop {
            let (sector, offset) = match self.cursor_slot(&mut cursor)? {
                Some(slot) => slot,
                None => return Ok(false),
            };
            if sector != cached_sector {
                self.read_sector(sector, &mut buf)?;
                cached_sector = sector;
            }
            let rec = &buf[offset..offset + DIR_ENTRY_SIZE];
            let first = name::record_first_byte(rec);
            if first == DIR_ENTRY_END {
                return Ok(false);
            }
            cursor.position += DIR_ENTRY_SIZE as u32;
            if first == DIR_ENTRY_FREE || name::record_is_lfn(rec) {
                continue;
            }
            if &name::record_short_name(rec) == short {
                return Ok(true);
            }
        }
    }

    /// Pick an 8.3 alias for a long filename that collides with nothing in
    /// the directory, trying `~1` through `~999999`.
    fn unique_short_name(&mut self, dir_cluster: u32, filename: &str) -> Fat32Result<[u8; 11]> {
        self.unique_short_name_within(dir_cluster, filename, 999_999)
    }

    /// Running out of tails means no new name can be minted in this
    /// directory, a disk-full-class condition.
    fn unique_short_name_within(
        &mut self,
        dir_cluster: u32,
        filename: &str,
        max_tail: u32,
    ) -> Fat32Result<[u8; 11]> {
        let sanitized = SanitizedName::from_filename(filename);
        if !sanitized.needs_tail() {
            let plain = sanitized.plain_candidate();
            if !self.short_name_exists(dir_cluster, &plain)? {
                return Ok(plain);
            }
        }
        for n in 1..=max_tail {
            let candidate = sanitized.tail_candidate(n);
            if !self.short_name_exists(dir_cluster, &candidate)? {
                return Ok(candidate);
            }
        }
        Err(Fat32Error::DiskFull)
    }

    /// Rewrite one 32-byte record in place.
    fn write_record(&mut self, sector: u32, offset: usize, rec: &[u8; DIR_ENTRY_SIZE]) -> Fat32Result<()> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buf)?;
        buf[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(rec);
        self.write_sector(sector, &buf)
    }

    /// Create a directory entry for `filename`: long-name fragments (when
    /// the name does not fit 8.3) followed by the short record, written
    /// into a run of adjacent free slots. The directory chain grows as
    /// needed. A zero `start_cluster` gets a fresh chain allocated.
    pub(crate) fn link_entry(
        &mut self,
        dir_cluster: u32,
        filename: &str,
        attributes: Attributes,
        start_cluster: u32,
        size: u32,
    ) -> Fat32Result<DirEntry> {
        if filename.is_empty() || filename.len() > MAX_FILENAME_LEN || !filename.is_ascii() {
            return Err(Fat32Error::InvalidPath);
        }

        let short = if name::is_valid_short_name(filename) {
            name::short_name_from_filename(filename)
        } else {
            self.unique_short_name(dir_cluster, filename)?
        };
        // Fragments are written even for names that fit 8.3, preserving
        // the original case.
        let fragments = name::lfn_fragment_count(filename.len());
        let needed = fragments + 1;

        // Find a run of `needed` adjacent free slots, extending the
        // directory with a zeroed cluster when the chain runs out.
        let mut cursor = DirCursor::new(dir_cluster);
        let mut run: usize = 0;
        let mut run_start: u32 = 0;
        let mut buf = [0u8; SECTOR_SIZE];
        let mut cached_sector = u32::MAX;
        loop {
            let (sector, offset) = match self.cursor_slot(&mut cursor)? {
                Some(slot) => slot,
                None => {
                    let grown = self.allocate_and_link_cluster(cursor.cluster)?;
                    self.clear_cluster(grown)?;
                    cursor.cluster = grown;
                    cursor.cluster_base = cursor.position;
                    continue;
                }
            };
            if sector != cached_sector {
                self.read_sector(sector, &mut buf)?;
                cached_sector = sector;
            }
            let first = buf[offset];
            if first == DIR_ENTRY_FREE || first == DIR_ENTRY_END {
                if run == 0 {
                    run_start = cursor.position;
                }
                run += 1;
            } else {
                run = 0;
            }
            cursor.position += DIR_ENTRY_SIZE as u32;
            if run == needed {
                break;
            }
        }

        let start_cluster = if start_cluster == 0 {
            self.allocate_first_cluster()?
        } else {
            start_cluster
        };

        // Physical order is highest fragment first, then the 8.3 record.
        let checksum = name::short_name_checksum(&short);
        for slot in 0..fragments {
            let logical = fragments - 1 - slot;
            let rec = name::encode_lfn_fragment(
                filename.as_bytes(),
                logical,
                logical == fragments - 1,
                checksum,
            );
            let pos = run_start + (slot as u32) * DIR_ENTRY_SIZE as u32;
            let (sector, offset) = self.position_in_dir(dir_cluster, pos)?;
            self.write_record(sector, offset, &rec)?;
        }
        let rec = name::make_short_record(&short, attributes, start_cluster, size);
        let pos = run_start + (fragments as u32) * DIR_ENTRY_SIZE as u32;
        let (sector, offset) = self.position_in_dir(dir_cluster, pos)?;
        self.write_record(sector, offset, &rec)?;
        debug!("fat32: linked '{}' at cluster {}", filename, start_cluster);

        let (name_buf, name_len) = DirEntry::from_name_bytes(filename.as_bytes());
        Ok(DirEntry {
            name_buf,
            name_len,
            short_name: short,
            attributes,
            size,
            start_cluster,
            sector,
            offset,
        })
    }

    /// Sector and offset of an absolute byte position inside a directory
    /// chain.
    fn position_in_dir(&mut self, dir_cluster: u32, position: u32) -> Fat32Result<(u32, usize)> {
        let vol = self.vol()?;
        let bpc = vol.bytes_per_cluster;
        let cluster = self.seek_to_cluster(dir_cluster, position / bpc)?;
        let in_cluster = position % bpc;
        let sector = self.vol()?.cluster_to_sector(cluster) + in_cluster / SECTOR_SIZE as u32;
        Ok((sector, (in_cluster as usize) % SECTOR_SIZE))
    }

    /// Mark an entry's record deleted, along with the long-name fragments
    /// directly above it (bounded by the cluster the record lives in).
    pub(crate) fn unlink_entry(&mut self, entry: &DirEntry) -> Fat32Result<()> {
        if entry.is_root() {
            return Err(Fat32Error::InvalidPath);
        }
        let vol = self.vol()?;
        let spc = vol.boot.sectors_per_cluster as u32;
        let cluster_index = (entry.sector - vol.first_data_sector) / spc;
        let cluster_first_sector = vol.first_data_sector + cluster_index * spc;

        let mut sector = entry.sector;
        let mut offset = entry.offset as isize;
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buf)?;
        buf[offset as usize] = DIR_ENTRY_FREE;
        loop {
            offset -= DIR_ENTRY_SIZE as isize;
            if offset < 0 {
                self.write_sector(sector, &buf)?;
                if sector == cluster_first_sector {
                    return Ok(());
                }
                sector -= 1;
                offset = (SECTOR_SIZE - DIR_ENTRY_SIZE) as isize;
                self.read_sector(sector, &mut buf)?;
            }
            let rec = &mut buf[offset as usize..offset as usize + DIR_ENTRY_SIZE];
            if name::record_first_byte(rec) == DIR_ENTRY_FREE || !name::record_is_lfn(rec) {
                break;
            }
            rec[0] = DIR_ENTRY_FREE;
        }
        self.write_sector(sector, &buf)
    }

    // ─── Public directory operations ─────────────────────────────────────

    /// Create a directory, including its `.` and `..` entries.
    pub fn create_dir(&mut self, path: &str) -> Fat32Result<()> {
        self.is_ready()?;
        let (parent, leaf) = self.resolve_parent(path)?;
        let parent_cluster = self.dir_cluster_or_root(parent.start_cluster)?;
        if self.find_in_dir(parent_cluster, leaf)?.is_some() {
            return Err(Fat32Error::FileExists);
        }

        let entry = self.link_entry(parent_cluster, leaf, Attributes::DIRECTORY, 0, 0)?;
        self.clear_cluster(entry.start_cluster)?;

        // `..` uses cluster 0 for the root, matching what every FAT
        // implementation expects to read back.
        let root = self.vol()?.boot.root_cluster;
        let dotdot_cluster = if parent_cluster == root { 0 } else { parent_cluster };
        let mut buf = [0u8; SECTOR_SIZE];
        let first_sector = self.vol()?.cluster_to_sector(entry.start_cluster);
        self.read_sector(first_sector, &mut buf)?;
        let dot = name::make_short_record(
            b".          ",
            Attributes::DIRECTORY,
            entry.start_cluster,
            0,
        );
        let dotdot =
            name::make_short_record(b"..         ", Attributes::DIRECTORY, dotdot_cluster, 0);
        buf[..DIR_ENTRY_SIZE].copy_from_slice(&dot);
        buf[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE].copy_from_slice(&dotdot);
        self.write_sector(first_sector, &buf)
    }

    /// Whether a directory holds anything besides `.` and `..`.
    fn dir_is_empty(&mut self, dir_cluster: u32) -> Fat32Result<bool> {
        let mut cursor = DirCursor::new(dir_cluster);
        while let Some(entry) = self.next_dir_entry(&mut cursor)? {
            if entry.name() != "." && entry.name() != ".." {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete a file or an empty directory. The records are unlinked
    /// before the chain is released; a failure in between leaks clusters
    /// but never leaves a live entry pointing at freed ones.
    pub fn delete(&mut self, path: &str) -> Fat32Result<()> {
        self.is_ready()?;
        let entry = self.find_entry(path)?;
        if entry.is_root() || entry.name() == "." || entry.name() == ".." {
            return Err(Fat32Error::InvalidPath);
        }
        if entry.is_directory() {
            let cluster = self.dir_cluster_or_root(entry.start_cluster)?;
            if !self.dir_is_empty(cluster)? {
                return Err(Fat32Error::DirNotEmpty);
            }
        }
        self.unlink_entry(&entry)?;
        if entry.start_cluster >= 2 {
            self.release_cluster_chain(entry.start_cluster)?;
        }
        Ok(())
    }

    /// Rename an entry within its directory. The data chain is untouched;
    /// the old records are unlinked and fresh ones written for `new_name`.
    pub fn rename(&mut self, path: &str, new_name: &str) -> Fat32Result<()> {
        self.is_ready()?;
        if new_name.is_empty() || new_name.contains('/') {
            return Err(Fat32Error::InvalidPath);
        }
        let (parent, leaf) = self.resolve_parent(path)?;
        let parent_cluster = self.dir_cluster_or_root(parent.start_cluster)?;
        let entry = self
            .find_in_dir(parent_cluster, leaf)?
            .ok_or(Fat32Error::FileNotFound)?;
        if !entry.matches(new_name) && self.find_in_dir(parent_cluster, new_name)?.is_some() {
            return Err(Fat32Error::FileExists);
        }
        self.unlink_entry(&entry)?;
        self.link_entry(
            parent_cluster,
            new_name,
            entry.attributes,
            entry.start_cluster,
            entry.size,
        )?;
        Ok(())
    }

    // ─── Current directory ───────────────────────────────────────────────

    /// Change the directory relative paths resolve against.
    pub fn set_current_dir(&mut self, path: &str) -> Fat32Result<()> {
        self.is_ready()?;
        let entry = self.find_entry(path)?;
        if !entry.is_directory() {
            return Err(Fat32Error::NotADirectory);
        }
        let cluster = self.dir_cluster_or_root(entry.start_cluster)?;
        self.vol_mut()?.current_dir_cluster = cluster;
        Ok(())
    }

    /// Reconstruct the absolute path of the current directory into `out`,
    /// returning its length. Walks `..` links up to the root, then resolves
    /// each step's name on the way back down.
    pub fn current_dir(&mut self, out: &mut [u8]) -> Fat32Result<usize> {
        self.is_ready()?;
        let vol = self.vol()?;
        let root = vol.boot.root_cluster;

        // Chain of clusters from the current directory up to the root.
        let mut chain = [0u32; MAX_DIR_DEPTH];
        let mut depth = 0;
        let mut cluster = vol.current_dir_cluster;
        while cluster != root {
            if depth == MAX_DIR_DEPTH {
                return Err(Fat32Error::InvalidPath);
            }
            chain[depth] = cluster;
            depth += 1;
            let dotdot = self
                .find_in_dir(cluster, "..")?
                .ok_or(Fat32Error::DirNotFound)?;
            cluster = self.dir_cluster_or_root(dotdot.start_cluster)?;
        }

        if out.is_empty() {
            return Err(Fat32Error::InvalidParameter);
        }
        out[0] = b'/';
        let mut len = 1;
        let mut parent = root;
        for i in (0..depth).rev() {
            let child = chain[i];
            let entry = self
                .entry_with_cluster(parent, child)?
                .ok_or(Fat32Error::DirNotFound)?;
            let name = entry.name().as_bytes();
            if len > 1 {
                if len + 1 > out.len() {
                    return Err(Fat32Error::InvalidParameter);
                }
                out[len] = b'/';
                len += 1;
            }
            if len + name.len() > out.len() {
                return Err(Fat32Error::InvalidParameter);
            }
            out[len..len + name.len()].copy_from_slice(name);
            len += name.len();
            parent = child;
        }
        Ok(len)
    }

    /// Scan a directory for the entry whose chain starts at `cluster`.
    fn entry_with_cluster(&mut self, dir_cluster: u32, cluster: u32) -> Fat32Result<Option<DirEntry>> {
        let mut cursor = DirCursor::new(dir_cluster);
        while let Some(entry) = self.next_dir_entry(&mut cursor)? {
            if entry.start_cluster == cluster && entry.name() != "." && entry.name() != ".." {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// The volume label from the root directory, trailing spaces trimmed.
    /// Length 0 when the volume carries no label.
    pub fn volume_name(&mut self) -> Fat32Result<([u8; 11], usize)> {
        self.is_ready()?;
        let root = self.vol()?.boot.root_cluster;
        let mut cursor = DirCursor::new(root);
        let mut buf = [0u8; SECTOR_SIZE];
        let mut cached_sector = u32::MAX;
        loop {
            let (sector, offset) = match self.cursor_slot(&mut cursor)? {
                Some(slot) => slot,
                None => return Ok(([0u8; 11], 0)),
            };
            if sector != cached_sector {
                self.read_sector(sector, &mut buf)?;
                cached_sector = sector;
            }
            let rec = &buf[offset..offset + DIR_ENTRY_SIZE];
            let first = name::record_first_byte(rec);
            if first == DIR_ENTRY_END {
                return Ok(([0u8; 11], 0));
            }
            cursor.position += DIR_ENTRY_SIZE as u32;
            if first == DIR_ENTRY_FREE || name::record_is_lfn(rec) {
                continue;
            }
            let attributes = Attributes::from_bits_truncate(name::record_attr(rec));
            if attributes.is_volume_id() {
                let raw = name::record_short_name(rec);
                let len = raw.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
                return Ok((raw, len));
            }
        }
    }
}
