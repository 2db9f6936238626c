//! FAT32 filesystem engine for removable block devices.
//!
//! The engine owns a [`BlockDevice`] and exposes mount management, path
//! resolution, directory manipulation and byte-level file I/O on top of
//! it. It targets `no_std` environments: no allocation, no interior
//! mutability, and every sector buffer lives on the caller's stack. The
//! host test suite runs against in-memory images formatted and
//! cross-checked with the `fatfs` crate.
//!
//! ```no_run
//! # use fat32fs::{BlockDevice, Fat32Fs};
//! # fn demo<D: BlockDevice>(dev: D) -> Result<(), fat32fs::Fat32Error> {
//! let mut fs = Fat32Fs::new(dev);
//! fs.mount()?;
//! fs.create_dir("/logs")?;
//! let mut file = fs.create("/logs/boot.txt")?;
//! fs.write(&mut file, b"hello")?;
//! fs.close(&mut file);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), no_std)]

mod device;
mod dir;
mod error;
mod fat;
mod file;
mod fs;
mod name;
mod volume;

#[cfg(test)]
mod testutil;

pub use device::{BlockDevice, SECTOR_SIZE};
pub use dir::{DirEntry, MAX_DIR_DEPTH};
pub use error::{Fat32Error, Fat32Result};
pub use file::FileHandle;
pub use fs::Fat32Fs;
pub use name::{Attributes, MAX_FILENAME_LEN, MAX_PATH_LEN};
