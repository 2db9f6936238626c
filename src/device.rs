/// All disk I/O goes through this trait, making the engine unit-testable
/// with an in-memory mock (the production backend wraps an SD card driver).
///
/// Blocks are fixed at 512 bytes and addressed from the start of the
/// physical medium; the engine applies any partition offset itself.
/// Every call is synchronous and may fail.
pub trait BlockDevice {
    fn read_block(&mut self, block: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool;
    fn write_block(&mut self, block: u32, buf: &[u8; SECTOR_SIZE]) -> bool;

    /// Whether a card is physically present. Polled at the start of every
    /// engine operation; loss of presence forces an unmount.
    fn card_present(&self) -> bool;
}

pub const SECTOR_SIZE: usize = 512;
