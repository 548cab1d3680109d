//! A2DP (Advanced Audio Distribution Profile) Codec Negotiation
//!
//! This module decides which audio codec, and with which parameters, an A2DP
//! source uses to stream to a sink. It reconciles the peer's advertised
//! capability, the local capability (software encoders and hardware offload)
//! and user / audio-stream preferences into one concrete configuration, and
//! produces or parses the Codec Information Element exchanged over AVDTP.
//!
//! ## Architecture
//!
//! - **Codec Information Elements**: per-codec wire records ([`sbc`], [`aac`], [`vendor`])
//! - **Codec Plugins**: negotiation and state per codec ([`codec`])
//! - **Codec Registry**: priority-ordered plugins and the current codec ([`registry`])
//! - **Offload Tracker**: which codecs run in software or hardware ([`offload`])
//!
//! ## Usage
//!
//! ```rust
//! use codecbird::a2dp::{A2dpCodecs, CodecIndex};
//! use codecbird::a2dp::offload::{OffloadCapabilities, OffloadConfig};
//! use codecbird::A2dpCodecOptions;
//!
//! let offload = OffloadCapabilities::new(&OffloadConfig::default());
//! let mut codecs = A2dpCodecs::new(&[], offload, A2dpCodecOptions::default());
//! codecs.init(false).unwrap();
//! assert!(codecs.codec(CodecIndex::SourceSbc).is_some());
//! ```

pub mod aac;
pub mod codec;
pub mod config;
pub mod negotiation;
pub mod offload;
pub mod ota;
pub mod registry;
pub mod sbc;
pub mod vendor;

pub use codec::{A2dpCodec, CodecPlugin, CodecUpdate, CodecVariant, OffloadCodecInfo};
pub use config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
pub use negotiation::{Negotiated, NegotiationRequest};
pub use ota::CodecInfo;
pub use registry::{A2dpCodecs, CodecReport, PeerParams};

use crate::constants::MAX_CODECS;

/// A2DP Media Codec Types (A2DP specification, section 4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecType {
    /// SBC (Sub-Band Coding) - Mandatory codec for A2DP
    Sbc = 0x00,
    /// MPEG-1,2 Audio (MP3)
    Mpeg12Audio = 0x01,
    /// MPEG-2,4 AAC
    Mpeg24Aac = 0x02,
    /// ATRAC family
    Atrac = 0x04,
    /// Vendor-specific codec, identified by vendor ID and vendor codec ID
    VendorSpecific = 0xFF,
}

impl CodecType {
    /// Decode the media codec type octet
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Sbc),
            0x01 => Some(Self::Mpeg12Audio),
            0x02 => Some(Self::Mpeg24Aac),
            0x04 => Some(Self::Atrac),
            0xFF => Some(Self::VendorSpecific),
            _ => None,
        }
    }
}

/// Media type carried in the high nibble of the second IE octet
pub const MEDIA_TYPE_AUDIO: u8 = 0x00;

/// Codec index, one per codec plugin the registry knows about
///
/// The discriminant is the index used for default priorities and
/// tie-breaking; source codecs come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecIndex {
    /// SBC source
    SourceSbc = 0,
    /// AAC source
    SourceAac = 1,
    /// aptX source
    SourceAptx = 2,
    /// aptX-HD source
    SourceAptxHd = 3,
    /// LDAC source
    SourceLdac = 4,
    /// SBC sink
    SinkSbc = 5,
}

impl CodecIndex {
    /// Every codec index, in enumeration order
    pub const ALL: [Self; 6] = [
        Self::SourceSbc,
        Self::SourceAac,
        Self::SourceAptx,
        Self::SourceAptxHd,
        Self::SourceLdac,
        Self::SinkSbc,
    ];

    /// First sink index; everything below is a source codec
    const SINK_MIN: u8 = 5;

    /// Numeric index
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this codec encodes (source direction)
    #[must_use]
    pub const fn is_source(self) -> bool {
        self.as_u8() < Self::SINK_MIN
    }

    /// Human readable codec name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SourceSbc => "SBC",
            Self::SourceAac => "AAC",
            Self::SourceAptx => "aptX",
            Self::SourceAptxHd => "aptX-HD",
            Self::SourceLdac => "LDAC",
            Self::SinkSbc => "SBC (Sink)",
        }
    }

    /// Priority used when nothing else was configured: `1000 * (index + 1) + 1`
    #[must_use]
    pub const fn computed_default_priority(self) -> CodecPriority {
        CodecPriority(1000 * (self.as_u8() as i32 + 1) + 1)
    }
}

impl core::fmt::Display for CodecIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Codec selection priority; higher wins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecPriority(pub i32);

impl CodecPriority {
    /// Codec is disabled and never offered
    pub const DISABLED: Self = Self(-1);
    /// No explicit priority; the codec falls back to its default
    pub const DEFAULT: Self = Self(0);
    /// Highest priority a codec can have
    pub const HIGHEST: Self = Self(1_000_000);
}

/// Set of codec indices packed into a bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecSet(pub u8);

impl CodecSet {
    /// Empty set
    pub const EMPTY: Self = Self(0);

    /// Every source codec
    #[must_use]
    pub const fn all_sources() -> Self {
        Self(0b1_1111)
    }

    /// Build a set from a list of indices
    #[must_use]
    pub fn from_indices(indices: &[CodecIndex]) -> Self {
        indices.iter().fold(Self::EMPTY, |set, &index| set.with(index))
    }

    /// Return a copy of the set with `index` added
    #[must_use]
    pub const fn with(self, index: CodecIndex) -> Self {
        Self(self.0 | (1 << index.as_u8()))
    }

    /// Check if the set contains `index`
    #[must_use]
    pub const fn contains(self, index: CodecIndex) -> bool {
        self.0 & (1 << index.as_u8()) != 0
    }

    /// Intersection of two sets
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

/// List of codec configurations, e.g. per-codec priorities
pub type CodecConfigList = heapless::Vec<CodecConfig, MAX_CODECS>;

/// A2DP Errors
///
/// Each variant maps onto an A2DP / AVDTP status octet through [`A2dpError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum A2dpError {
    /// Missing or malformed input
    InvalidParams,
    /// IE length or codec type does not belong to this codec
    WrongCodec,
    /// Media codec type is not valid
    BadCodecType,
    /// Media codec type is not supported
    NsCodecType,
    /// Sampling frequency is not a single valid value
    BadSampFreq,
    /// Sampling frequency is not supported
    NsSampFreq,
    /// Channel mode is not a single valid value
    BadChMode,
    /// Channel mode is not supported
    NsChMode,
    /// SBC block length is not a single valid value
    BadBlockLen,
    /// SBC subbands is not a single valid value
    BadSubbands,
    /// SBC allocation method is not a single valid value
    BadAllocMethod,
    /// SBC minimum bitpool is out of range
    BadMinBitpool,
    /// SBC maximum bitpool is out of range or below the minimum
    BadMaxBitpool,
    /// AAC object type is not a single valid value
    BadObjType,
    /// Channel configuration is not valid
    BadChannel,
    /// No common bits per sample
    BadBitsPerSample,
    /// Registry ended up without a usable source or sink codec
    NoCodecs,
}

impl A2dpError {
    /// A2DP status octet carried in AVDTP rejects
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::InvalidParams => 0x0C,
            Self::WrongCodec => 0x0D,
            Self::BadCodecType => 0xC1,
            Self::NsCodecType => 0xC2,
            Self::BadSampFreq => 0xC3,
            Self::NsSampFreq => 0xC4,
            Self::BadChMode => 0xC5,
            Self::NsChMode => 0xC6,
            Self::BadSubbands => 0xC7,
            Self::BadAllocMethod => 0xC9,
            Self::BadMinBitpool => 0xCB,
            Self::BadMaxBitpool => 0xCD,
            Self::BadObjType => 0xD6,
            Self::BadChannel => 0xD8,
            Self::BadBlockLen => 0xDD,
            Self::BadBitsPerSample | Self::NoCodecs => 0x0A,
        }
    }
}

impl core::fmt::Display for A2dpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::InvalidParams => "invalid parameters",
            Self::WrongCodec => "wrong codec",
            Self::BadCodecType => "bad codec type",
            Self::NsCodecType => "codec type not supported",
            Self::BadSampFreq => "bad sampling frequency",
            Self::NsSampFreq => "sampling frequency not supported",
            Self::BadChMode => "bad channel mode",
            Self::NsChMode => "channel mode not supported",
            Self::BadBlockLen => "bad block length",
            Self::BadSubbands => "bad subbands",
            Self::BadAllocMethod => "bad allocation method",
            Self::BadMinBitpool => "bad minimum bitpool",
            Self::BadMaxBitpool => "bad maximum bitpool",
            Self::BadObjType => "bad object type",
            Self::BadChannel => "bad channel",
            Self::BadBitsPerSample => "no common bits per sample",
            Self::NoCodecs => "no usable codecs",
        };
        f.write_str(msg)
    }
}
