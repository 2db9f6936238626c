//! Directory entry codec: 8.3 short names, long-filename fragments and the
//! checksum binding them, plus the raw 32-byte record layout.
//!
//! Everything here is pure byte/string manipulation; no I/O. On-disk fields
//! are decoded and encoded explicitly as little-endian byte slices rather
//! than overlaying packed structs.

use bitflags::bitflags;

pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_PATH_LEN: usize = 260;

pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_ENTRY_FREE: u8 = 0xE5;
pub const DIR_ENTRY_END: u8 = 0x00;

/// 13 UTF-16 code units per fragment, at most 20 fragments per name.
pub const LFN_CHARS_PER_FRAGMENT: usize = 13;
pub const MAX_LFN_FRAGMENTS: usize = 20;
const LFN_LAST_FLAG: u8 = 0x40;
const LFN_SEQ_MASK: u8 = 0x3F;

bitflags! {
    /// Directory-record attribute byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
    }
}

/// All four low attribute bits set marks a long-name fragment.
pub const ATTR_LONG_NAME: u8 = 0x0F;

impl Attributes {
    pub fn is_directory(self) -> bool {
        self.contains(Attributes::DIRECTORY)
    }

    pub fn is_volume_id(self) -> bool {
        self.contains(Attributes::VOLUME_ID)
    }
}

// ─── Little-endian field access ────────────────────────────────────────────────

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

pub(crate) fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

// ─── Raw 32-byte record layout ─────────────────────────────────────────────────

// Short record: name[11] attr nt_res crt_tenth crt_time crt_date acc_date
// clus_hi wrt_time wrt_date clus_lo size.
const REC_ATTR: usize = 11;
const REC_CLUS_HI: usize = 20;
const REC_CLUS_LO: usize = 26;
const REC_SIZE: usize = 28;

pub(crate) fn record_first_byte(rec: &[u8]) -> u8 {
    rec[0]
}

pub(crate) fn record_attr(rec: &[u8]) -> u8 {
    rec[REC_ATTR]
}

pub(crate) fn record_is_lfn(rec: &[u8]) -> bool {
    rec[REC_ATTR] == ATTR_LONG_NAME
}

pub(crate) fn record_cluster(rec: &[u8]) -> u32 {
    ((read_u16(rec, REC_CLUS_HI) as u32) << 16) | read_u16(rec, REC_CLUS_LO) as u32
}

pub(crate) fn record_size(rec: &[u8]) -> u32 {
    read_u32(rec, REC_SIZE)
}

pub(crate) fn record_short_name(rec: &[u8]) -> [u8; 11] {
    let mut name = [0u8; 11];
    name.copy_from_slice(&rec[..11]);
    name
}

pub(crate) fn record_set_cluster(rec: &mut [u8], cluster: u32) {
    write_u16(rec, REC_CLUS_HI, (cluster >> 16) as u16);
    write_u16(rec, REC_CLUS_LO, (cluster & 0xFFFF) as u16);
}

pub(crate) fn record_set_size(rec: &mut [u8], size: u32) {
    write_u32(rec, REC_SIZE, size);
}

/// Build a complete short-name record. Timestamps are left zero; the engine
/// has no clock source.
pub(crate) fn make_short_record(
    short: &[u8; 11],
    attr: Attributes,
    cluster: u32,
    size: u32,
) -> [u8; DIR_ENTRY_SIZE] {
    let mut rec = [0u8; DIR_ENTRY_SIZE];
    rec[..11].copy_from_slice(short);
    rec[REC_ATTR] = attr.bits();
    record_set_cluster(&mut rec, cluster);
    record_set_size(&mut rec, size);
    rec
}

// ─── Short (8.3) names ─────────────────────────────────────────────────────────

// Characters that may never appear in an 8.3 component.
const FORBIDDEN_83: &[u8] = b"\"*+,./:;<=>?[\\]|";

// Characters allowed verbatim when synthesizing a short name; everything
// else becomes '_' and marks the result lossy.
const KEEP_83: &[u8] = b"$%'-_@~`!(){}^#&";

fn short_char_ok(c: u8) -> bool {
    c > 0x20 && !FORBIDDEN_83.contains(&c)
}

/// Whether `filename` can be stored directly as an 8.3 name: 1-8 name
/// characters plus an optional 1-3 character extension, at most one dot and
/// never at position 0, no forbidden characters.
pub fn is_valid_short_name(filename: &str) -> bool {
    let bytes = filename.as_bytes();
    if bytes.is_empty() || bytes.len() > 12 {
        return false;
    }
    let dot = match bytes.iter().position(|&b| b == b'.') {
        Some(0) => return false,
        Some(i) => {
            if bytes[i + 1..].contains(&b'.') {
                return false;
            }
            Some(i)
        }
        None => None,
    };
    let (base, ext) = match dot {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (bytes, &bytes[..0]),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return false;
    }
    base.iter().chain(ext.iter()).all(|&c| short_char_ok(c))
}

/// Pack a valid 8.3 filename into the fixed 11-byte on-disk form,
/// uppercased and space-padded. `"hello.txt"` becomes `"HELLO   TXT"`.
pub fn short_name_from_filename(filename: &str) -> [u8; 11] {
    let mut short = [b' '; 11];
    let bytes = filename.as_bytes();
    let (base, ext) = match bytes.iter().rposition(|&b| b == b'.') {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (bytes, &bytes[..0]),
    };
    for (i, &b) in base.iter().take(8).enumerate() {
        short[i] = b.to_ascii_uppercase();
    }
    for (i, &b) in ext.iter().take(3).enumerate() {
        short[8 + i] = b.to_ascii_uppercase();
    }
    short
}

/// Decode the fixed 11-byte form back to a lowercased `name.ext` filename.
/// Returns the buffer and the number of valid bytes.
pub fn filename_from_short_name(short: &[u8; 11]) -> ([u8; 12], usize) {
    let mut out = [0u8; 12];
    let mut len = 0;
    let base_end = short[..8].iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    for &b in &short[..base_end] {
        out[len] = b.to_ascii_lowercase();
        len += 1;
    }
    let ext_end = short[8..].iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    if ext_end > 0 {
        out[len] = b'.';
        len += 1;
        for &b in &short[8..8 + ext_end] {
            out[len] = b.to_ascii_lowercase();
            len += 1;
        }
    }
    (out, len)
}

/// Rotate-right-and-add sum over the raw 11 short-name bytes. Binds
/// long-name fragments to their short record; only 8 bits wide, so
/// unrelated names can collide (see `LfnAssembler` for the tie-break).
pub fn short_name_checksum(short: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in short {
        sum = (if sum & 1 != 0 { 0x80u8 } else { 0 })
            .wrapping_add(sum >> 1)
            .wrapping_add(b);
    }
    sum
}

// ─── Short-name synthesis for long filenames ───────────────────────────────────

/// A long filename reduced to its 8.3 base/extension per the Microsoft
/// numeric-tail algorithm: uppercase, spaces stripped, leading dots
/// stripped, invalid characters replaced by '_'.
pub struct SanitizedName {
    pub base: [u8; 8],
    pub base_len: usize,
    pub ext: [u8; 3],
    pub ext_len: usize,
    /// A character was replaced by '_'.
    pub lossy: bool,
    /// Base or extension did not fit 8/3.
    pub truncated: bool,
}

impl SanitizedName {
    pub fn from_filename(filename: &str) -> SanitizedName {
        let mut sanitized = SanitizedName {
            base: [0; 8],
            base_len: 0,
            ext: [0; 3],
            ext_len: 0,
            lossy: false,
            truncated: false,
        };

        // Uppercase, strip spaces, strip leading dots.
        let mut cleaned = [0u8; MAX_FILENAME_LEN];
        let mut cleaned_len = 0;
        for &b in filename.as_bytes().iter().take(MAX_FILENAME_LEN) {
            if b == b' ' {
                continue;
            }
            if b == b'.' && cleaned_len == 0 {
                continue;
            }
            cleaned[cleaned_len] = b.to_ascii_uppercase();
            cleaned_len += 1;
        }
        let cleaned = &cleaned[..cleaned_len];

        let dot = cleaned.iter().rposition(|&b| b == b'.');
        let (base_src, ext_src) = match dot {
            Some(i) => (&cleaned[..i], &cleaned[i + 1..]),
            None => (cleaned, &cleaned[..0]),
        };

        for &b in base_src {
            if sanitized.base_len == 8 {
                sanitized.truncated = true;
                break;
            }
            sanitized.base[sanitized.base_len] = sanitize_char(b, &mut sanitized.lossy);
            sanitized.base_len += 1;
        }
        // A dot inside the base would have split it; any remaining dots in
        // base_src are themselves invalid characters.
        for &b in ext_src {
            if sanitized.ext_len == 3 {
                sanitized.truncated = true;
                break;
            }
            sanitized.ext[sanitized.ext_len] = sanitize_char(b, &mut sanitized.lossy);
            sanitized.ext_len += 1;
        }

        sanitized
    }

    /// The candidate without a numeric tail.
    pub fn plain_candidate(&self) -> [u8; 11] {
        let mut short = [b' '; 11];
        short[..self.base_len].copy_from_slice(&self.base[..self.base_len]);
        short[8..8 + self.ext_len].copy_from_slice(&self.ext[..self.ext_len]);
        short
    }

    /// Whether a numeric tail is required even before any collision check.
    pub fn needs_tail(&self) -> bool {
        self.lossy || self.truncated || self.base_len == 0
    }

    /// Candidate with a `~N` tail, consuming trailing base characters as
    /// needed to keep the total base at 8. `n` must be 1..=999_999.
    pub fn tail_candidate(&self, n: u32) -> [u8; 11] {
        let mut tail = [0u8; 7];
        let tail_len = format_tail(n, &mut tail);
        let base_len = self.base_len.min(8 - tail_len);

        let mut short = [b' '; 11];
        short[..base_len].copy_from_slice(&self.base[..base_len]);
        short[base_len..base_len + tail_len].copy_from_slice(&tail[..tail_len]);
        short[8..8 + self.ext_len].copy_from_slice(&self.ext[..self.ext_len]);
        short
    }
}

fn sanitize_char(c: u8, lossy: &mut bool) -> u8 {
    if c.is_ascii_uppercase() || c.is_ascii_digit() || KEEP_83.contains(&c) {
        c
    } else {
        *lossy = true;
        b'_'
    }
}

// "~" followed by the decimal digits of n.
fn format_tail(n: u32, out: &mut [u8; 7]) -> usize {
    let mut digits = [0u8; 6];
    let mut count = 0;
    let mut v = n;
    while v > 0 {
        digits[count] = b'0' + (v % 10) as u8;
        count += 1;
        v /= 10;
    }
    out[0] = b'~';
    for i in 0..count {
        out[1 + i] = digits[count - 1 - i];
    }
    1 + count
}

// ─── Long-filename fragments ───────────────────────────────────────────────────

/// Number of 32-byte fragments needed to store `len` name characters.
pub fn lfn_fragment_count(len: usize) -> usize {
    len.div_ceil(LFN_CHARS_PER_FRAGMENT)
}

// Byte offsets of the three UTF-16 groups inside a fragment (5 + 6 + 2).
const LFN_GROUP_OFFSETS: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];
const LFN_CHECKSUM: usize = 13;

/// Encode one long-name fragment. `index` is the logical fragment index
/// (0 = first 13 characters of the name); the fragment covering the end of
/// the name carries the last-fragment flag. Characters past the end of the
/// name encode a single NUL terminator followed by 0xFFFF padding.
pub fn encode_lfn_fragment(
    name: &[u8],
    index: usize,
    last: bool,
    checksum: u8,
) -> [u8; DIR_ENTRY_SIZE] {
    let mut rec = [0u8; DIR_ENTRY_SIZE];
    rec[0] = (index as u8 + 1) | if last { LFN_LAST_FLAG } else { 0 };
    rec[REC_ATTR] = ATTR_LONG_NAME;
    rec[LFN_CHECKSUM] = checksum;
    // type byte (12) and first-cluster field (26..28) stay zero

    let mut pos = index * LFN_CHARS_PER_FRAGMENT;
    for (offset, count) in LFN_GROUP_OFFSETS {
        for i in 0..count {
            let ch: u16 = match pos.cmp(&name.len()) {
                core::cmp::Ordering::Less => name[pos] as u16,
                core::cmp::Ordering::Equal => 0x0000,
                core::cmp::Ordering::Greater => 0xFFFF,
            };
            write_u16(&mut rec, offset + i * 2, ch);
            pos += 1;
        }
    }
    rec
}

/// Reassembles long-name fragments while scanning a directory.
///
/// A short-name record is only credited with a long name when a non-empty,
/// checksum-matching fragment run immediately precedes it. Any live short
/// entry, deleted slot, or volume label resets the run, so fragments can
/// never attach to a non-adjacent record even when the 8-bit checksum
/// collides.
pub struct LfnAssembler {
    buf: [u8; MAX_FILENAME_LEN],
    /// Highest name byte written + 1.
    extent: usize,
    checksum: u8,
    active: bool,
}

impl LfnAssembler {
    pub fn new() -> LfnAssembler {
        LfnAssembler {
            buf: [0; MAX_FILENAME_LEN],
            extent: 0,
            checksum: 0,
            active: false,
        }
    }

    pub fn reset(&mut self) {
        self.extent = 0;
        self.active = false;
    }

    /// Feed one raw 32-byte fragment record.
    pub fn push_fragment(&mut self, rec: &[u8]) {
        let seq = rec[0];
        if seq & LFN_LAST_FLAG != 0 {
            // First fragment of a new physical run.
            self.buf = [0; MAX_FILENAME_LEN];
            self.extent = 0;
            self.checksum = rec[LFN_CHECKSUM];
            self.active = true;
        }
        if !self.active || rec[LFN_CHECKSUM] != self.checksum {
            self.reset();
            return;
        }

        let index = (seq & LFN_SEQ_MASK) as usize;
        if index == 0 || index > MAX_LFN_FRAGMENTS {
            self.reset();
            return;
        }
        let mut pos = (index - 1) * LFN_CHARS_PER_FRAGMENT;
        for (offset, count) in LFN_GROUP_OFFSETS {
            for i in 0..count {
                let ch = read_u16(rec, offset + i * 2);
                if ch != 0x0000 && ch != 0xFFFF && pos < MAX_FILENAME_LEN {
                    // Non-ASCII code points are lossily mapped.
                    self.buf[pos] = if ch < 0x80 { ch as u8 } else { b'?' };
                    self.extent = self.extent.max(pos + 1);
                }
                pos += 1;
            }
        }
    }

    /// Hand over the assembled name for the short record whose checksum is
    /// `short_checksum`, or `None` when no trusted run precedes it.
    /// Always leaves the assembler reset.
    pub fn take_for(&mut self, short_checksum: u8) -> Option<([u8; MAX_FILENAME_LEN], usize)> {
        let credited = self.active && self.extent > 0 && self.checksum == short_checksum;
        let result = if credited {
            // Name runs up to the first NUL.
            let len = self.buf[..self.extent]
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(self.extent);
            (len > 0).then_some((self.buf, len))
        } else {
            None
        };
        self.reset();
        result
    }
}
