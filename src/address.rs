use crate::constants::BD_ADDR_LENGTH;

/// Peer device address (`BD_ADDR`), as logged with negotiation events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; BD_ADDR_LENGTH]);

impl BluetoothAddress {
    /// Wrap raw address bytes, most significant first
    #[must_use]
    pub const fn new(addr: [u8; BD_ADDR_LENGTH]) -> Self {
        Self(addr)
    }
}

impl From<[u8; BD_ADDR_LENGTH]> for BluetoothAddress {
    fn from(addr: [u8; BD_ADDR_LENGTH]) -> Self {
        Self(addr)
    }
}

impl core::fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display() {
        let addr = BluetoothAddress::new([0x00, 0x1B, 0xDC, 0x0F, 0xA2, 0x7E]);
        assert_eq!(addr.to_string(), "00:1B:DC:0F:A2:7E");
        assert_eq!(BluetoothAddress::default().to_string(), "00:00:00:00:00:00");
    }
}
