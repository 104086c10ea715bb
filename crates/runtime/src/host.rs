//! Host port
//!
//! The embedding supplies the byte link, the clock, and the board identity
//! through this trait. Every method must be non-blocking: the runtime is
//! single-threaded and a stalled call here stalls the interpreter too.

/// Board services required by the runtime
pub trait HostPort {
    /// Read available link bytes into `buf`, returning how many were read
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize;

    /// Offer one byte to the link; `true` if it was accepted
    fn send_byte(&mut self, byte: u8) -> bool;

    /// Free-running microsecond counter; wrapping is allowed
    fn microsecs(&mut self) -> u32;

    /// Reboot hook
    fn system_reset(&mut self);

    /// Board name reported in the version message
    fn board_type(&self) -> &str;
}
