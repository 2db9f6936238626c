use core::fmt;

/// Every engine operation reports one of these. There are no panics on the
/// error paths; callers are expected to check every return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fat32Error {
    /// No card present in the slot (or it was removed mid-session).
    NoCard,
    /// Operation requires a mounted volume.
    NotMounted,
    /// The block transport failed to read a sector.
    ReadFailed,
    /// The block transport failed to write a sector.
    WriteFailed,
    /// Not a FAT32 volume, or a malformed boot/FSInfo sector.
    InvalidFormat,
    FileNotFound,
    DirNotFound,
    /// Path component resolved to something that is not a file.
    NotAFile,
    /// Path component resolved to something that is not a directory.
    NotADirectory,
    FileExists,
    DirNotEmpty,
    /// Path is too long or otherwise unusable.
    InvalidPath,
    /// Position points past the end of a cluster chain.
    InvalidPosition,
    InvalidParameter,
    /// No free cluster, or the 8.3 numeric-tail space is exhausted.
    DiskFull,
}

pub type Fat32Result<T> = Result<T, Fat32Error>;

impl Fat32Error {
    /// Human-readable message, suitable for a shell or status line.
    pub fn as_str(self) -> &'static str {
        match self {
            Fat32Error::NoCard => "no card present",
            Fat32Error::NotMounted => "file system not mounted",
            Fat32Error::ReadFailed => "read operation failed",
            Fat32Error::WriteFailed => "write operation failed",
            Fat32Error::InvalidFormat => "invalid volume format",
            Fat32Error::FileNotFound => "file not found",
            Fat32Error::DirNotFound => "directory not found",
            Fat32Error::NotAFile => "not a file",
            Fat32Error::NotADirectory => "not a directory",
            Fat32Error::FileExists => "file already exists",
            Fat32Error::DirNotEmpty => "directory not empty",
            Fat32Error::InvalidPath => "invalid path",
            Fat32Error::InvalidPosition => "invalid file position",
            Fat32Error::InvalidParameter => "invalid parameter",
            Fat32Error::DiskFull => "disk full",
        }
    }
}

impl fmt::Display for Fat32Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
