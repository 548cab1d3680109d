//! `Codecbird` Constants
//!
//! This module contains the constants shared by the codec plugins and the
//! codec registry: buffer sizes, wire-format discriminators and limits.

/// Size of a Codec Information Element buffer, including the LOSC octet
pub const AVDT_CODEC_SIZE: usize = 20;

/// Offset of the media type octet within a codec info buffer
pub const MEDIA_TYPE_OFFSET: usize = 1;

/// Offset of the media codec type octet within a codec info buffer
pub const CODEC_TYPE_OFFSET: usize = 2;

/// Offset of the first octet of the vendor ID in a non-A2DP codec info buffer
pub const VENDOR_ID_OFFSET: usize = 3;

/// Offset of the first octet of the vendor codec ID in a non-A2DP codec info buffer
pub const VENDOR_CODEC_ID_OFFSET: usize = 7;

/// Offset of the first codec-specific octet in a non-A2DP codec info buffer
pub const VENDOR_PAYLOAD_OFFSET: usize = 9;

/// Maximum number of codec plugins the registry can hold
///
/// Must stay a power of two, it sizes `FnvIndexMap`s.
pub const MAX_CODECS: usize = 8;

/// Number of `codec_specific` slots in a codec configuration
pub const CODEC_SPECIFIC_SLOTS: usize = 4;

/// Size of the offload codec parameter block handed to the audio HAL
pub const OFFLOAD_CODEC_INFO_SIZE: usize = 32;

/// Maximum length of the offload capability string (e.g. `"sbc-aac-aptx-ldac"`)
pub const MAX_OFFLOAD_CAPS_LENGTH: usize = 64;

/// `BD_ADDR` length in bytes
pub const BD_ADDR_LENGTH: usize = 6;
