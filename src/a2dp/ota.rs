//! Codec Information Element helpers
//!
//! Shared routines for the over-the-air (OTA) codec info layout:
//!
//! ```text
//! [0]  LOSC (length of the element, excluding this octet)
//! [1]  media type << 4
//! [2]  media codec type
//! [3..] codec specific; for vendor codecs:
//!      [3..7] vendor ID (LE), [7..9] vendor codec ID (LE), [9..] payload
//! ```

use super::{A2dpError, CodecType, MEDIA_TYPE_AUDIO};
use crate::constants::{
    AVDT_CODEC_SIZE, CODEC_TYPE_OFFSET, MEDIA_TYPE_OFFSET, VENDOR_CODEC_ID_OFFSET,
    VENDOR_ID_OFFSET, VENDOR_PAYLOAD_OFFSET,
};

/// Codec info buffer as exchanged with the transport, zero padded
pub type CodecInfo = [u8; AVDT_CODEC_SIZE];

/// Length field of the element
#[must_use]
pub fn losc(info: &[u8]) -> Option<u8> {
    info.first().copied()
}

/// Media type from the high nibble of the second octet
#[must_use]
pub fn media_type(info: &[u8]) -> Option<u8> {
    info.get(MEDIA_TYPE_OFFSET).map(|b| b >> 4)
}

/// Raw media codec type octet
#[must_use]
pub fn codec_type_raw(info: &[u8]) -> Option<u8> {
    info.get(CODEC_TYPE_OFFSET).copied()
}

/// Media codec type
#[must_use]
pub fn codec_type(info: &[u8]) -> Option<CodecType> {
    codec_type_raw(info).and_then(CodecType::from_u8)
}

/// Vendor ID of a non-A2DP codec
#[must_use]
pub fn vendor_id(info: &[u8]) -> Option<u32> {
    let bytes = info.get(VENDOR_ID_OFFSET..VENDOR_CODEC_ID_OFFSET)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Vendor codec ID of a non-A2DP codec
#[must_use]
pub fn vendor_codec_id(info: &[u8]) -> Option<u16> {
    let bytes = info.get(VENDOR_CODEC_ID_OFFSET..VENDOR_PAYLOAD_OFFSET)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Check whether the buffer holds anything at all
#[must_use]
pub fn is_empty(info: &[u8]) -> bool {
    info.iter().all(|&b| b == 0)
}

/// Validate the header of an A2DP-defined codec element
///
/// # Errors
/// `InvalidParams` if `info` is too short for an element of `expected`
/// octets, `WrongCodec` if the length, media type or codec type do not match
pub fn check_header(info: &[u8], expected: u8, codec_type: CodecType) -> Result<(), A2dpError> {
    if info.len() <= usize::from(expected) {
        return Err(A2dpError::InvalidParams);
    }
    if losc(info) != Some(expected) {
        return Err(A2dpError::WrongCodec);
    }
    if media_type(info) != Some(MEDIA_TYPE_AUDIO) || codec_type_raw(info) != Some(codec_type as u8) {
        return Err(A2dpError::WrongCodec);
    }
    Ok(())
}

/// Validate the header of a vendor-specific codec element
///
/// # Errors
/// Same as [`check_header`]; a vendor or codec ID mismatch is `WrongCodec`
pub fn check_vendor_header(
    info: &[u8],
    losc: u8,
    vendor: u32,
    codec: u16,
) -> Result<(), A2dpError> {
    check_header(info, losc, CodecType::VendorSpecific)?;
    if vendor_id(info) != Some(vendor) || vendor_codec_id(info) != Some(codec) {
        return Err(A2dpError::WrongCodec);
    }
    Ok(())
}

/// Start a new element with the common header
#[must_use]
pub fn new_info(losc: u8, codec_type: CodecType) -> CodecInfo {
    let mut info = [0u8; AVDT_CODEC_SIZE];
    info[0] = losc;
    info[MEDIA_TYPE_OFFSET] = MEDIA_TYPE_AUDIO << 4;
    info[CODEC_TYPE_OFFSET] = codec_type as u8;
    info
}

/// Start a new vendor element with the common and vendor headers
#[must_use]
pub fn new_vendor_info(losc: u8, vendor: u32, codec: u16) -> CodecInfo {
    let mut info = new_info(losc, CodecType::VendorSpecific);
    info[VENDOR_ID_OFFSET..VENDOR_CODEC_ID_OFFSET].copy_from_slice(&vendor.to_le_bytes());
    info[VENDOR_CODEC_ID_OFFSET..VENDOR_PAYLOAD_OFFSET].copy_from_slice(&codec.to_le_bytes());
    info
}

/// Check that exactly one bit is set
#[must_use]
pub const fn is_single_bit(value: u32) -> bool {
    value.count_ones() == 1
}
