//! Codec-independent configuration records
//!
//! [`CodecConfig`] is the view of a codec configuration shared by every
//! plugin: it describes negotiated configurations, capabilities, user
//! preferences and audio-stream preferences. Empty fields (`NONE`) mean
//! "no preference" in a preference record.

use core::ops::{BitAnd, BitOr, BitOrAssign};

use super::{CodecIndex, CodecPriority};
use crate::constants::CODEC_SPECIFIC_SLOTS;

macro_rules! config_mask {
    ($name:ident) => {
        impl $name {
            /// No value selected
            pub const NONE: Self = Self(0);

            /// Check if no bit is set
            #[must_use]
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }

            /// Check if every bit of `other` is set
            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                other.0 != 0 && self.0 & other.0 == other.0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                u32::from(value.0)
            }
        }
    };
}

/// PCM sample rate (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// 44100 Hz
    pub const HZ_44100: Self = Self(0x01);
    /// 48000 Hz
    pub const HZ_48000: Self = Self(0x02);
    /// 88200 Hz
    pub const HZ_88200: Self = Self(0x04);
    /// 96000 Hz
    pub const HZ_96000: Self = Self(0x08);
    /// 176400 Hz
    pub const HZ_176400: Self = Self(0x10);
    /// 192000 Hz
    pub const HZ_192000: Self = Self(0x20);
    /// 16000 Hz
    pub const HZ_16000: Self = Self(0x40);
    /// 24000 Hz
    pub const HZ_24000: Self = Self(0x80);
    /// 32000 Hz
    pub const HZ_32000: Self = Self(0x100);
    /// 8000 Hz
    pub const HZ_8000: Self = Self(0x200);

    const TABLE: [(Self, u32); 10] = [
        (Self::HZ_44100, 44_100),
        (Self::HZ_48000, 48_000),
        (Self::HZ_88200, 88_200),
        (Self::HZ_96000, 96_000),
        (Self::HZ_176400, 176_400),
        (Self::HZ_192000, 192_000),
        (Self::HZ_16000, 16_000),
        (Self::HZ_24000, 24_000),
        (Self::HZ_32000, 32_000),
        (Self::HZ_8000, 8_000),
    ];

    /// Frequency in Hz, if exactly one rate is selected
    #[must_use]
    pub fn hz(self) -> Option<u32> {
        Self::TABLE
            .iter()
            .find(|(rate, _)| *rate == self)
            .map(|&(_, hz)| hz)
    }
}

config_mask!(SampleRate);

/// Bits per PCM sample (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitsPerSample(pub u8);

impl BitsPerSample {
    /// 16 bits
    pub const BITS_16: Self = Self(0x01);
    /// 24 bits
    pub const BITS_24: Self = Self(0x02);
    /// 32 bits
    pub const BITS_32: Self = Self(0x04);

    /// Sample width in bits, if exactly one width is selected
    #[must_use]
    pub const fn bits(self) -> Option<u8> {
        match self {
            Self::BITS_16 => Some(16),
            Self::BITS_24 => Some(24),
            Self::BITS_32 => Some(32),
            _ => None,
        }
    }
}

config_mask!(BitsPerSample);

/// PCM channel mode (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMode(pub u8);

impl ChannelMode {
    /// Mono
    pub const MONO: Self = Self(0x01);
    /// Stereo
    pub const STEREO: Self = Self(0x02);

    /// Number of PCM channels, if exactly one mode is selected
    #[must_use]
    pub const fn channel_count(self) -> Option<u8> {
        match self {
            Self::MONO => Some(1),
            Self::STEREO => Some(2),
            _ => None,
        }
    }
}

config_mask!(ChannelMode);

impl core::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_none() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for &(rate, hz) in &Self::TABLE {
            if self.0 & rate.0 != 0 {
                if !first {
                    f.write_str("|")?;
                }
                first = false;
                write!(f, "{hz}")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Display for BitsPerSample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_none() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for width in [Self::BITS_16, Self::BITS_24, Self::BITS_32] {
            if self.0 & width.0 != 0 {
                if !first {
                    f.write_str("|")?;
                }
                first = false;
                if let Some(bits) = width.bits() {
                    write!(f, "{bits}")?;
                }
            }
        }
        Ok(())
    }
}

impl core::fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (self.0 & Self::MONO.0 != 0, self.0 & Self::STEREO.0 != 0) {
            (false, false) => f.write_str("NONE"),
            (true, false) => f.write_str("MONO"),
            (false, true) => f.write_str("STEREO"),
            (true, true) => f.write_str("MONO|STEREO"),
        }
    }
}

/// Codec-independent codec configuration or capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecConfig {
    /// Codec this record refers to; `None` targets the current codec
    pub codec_index: Option<CodecIndex>,
    /// Codec priority
    pub priority: CodecPriority,
    /// Sample rate(s)
    pub sample_rate: SampleRate,
    /// Bits per sample
    pub bits_per_sample: BitsPerSample,
    /// Channel mode(s)
    pub channel_mode: ChannelMode,
    /// Opaque codec-specific values, copied through when non-zero
    pub codec_specific: [i64; CODEC_SPECIFIC_SLOTS],
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            codec_index: None,
            priority: CodecPriority::DEFAULT,
            sample_rate: SampleRate::NONE,
            bits_per_sample: BitsPerSample::NONE,
            channel_mode: ChannelMode::NONE,
            codec_specific: [0; CODEC_SPECIFIC_SLOTS],
        }
    }
}

impl CodecConfig {
    /// Create an empty record for `codec_index`
    #[must_use]
    pub fn for_codec(codec_index: CodecIndex) -> Self {
        Self {
            codec_index: Some(codec_index),
            ..Self::default()
        }
    }

    /// Set the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: CodecPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the sample rate
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: SampleRate) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the bits per sample
    #[must_use]
    pub const fn with_bits_per_sample(mut self, bits_per_sample: BitsPerSample) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    /// Set the channel mode
    #[must_use]
    pub const fn with_channel_mode(mut self, channel_mode: ChannelMode) -> Self {
        self.channel_mode = channel_mode;
        self
    }

    /// Check whether the record expresses no preference at all
    ///
    /// The codec index is not considered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priority == CodecPriority::DEFAULT
            && self.sample_rate.is_none()
            && self.bits_per_sample.is_none()
            && self.channel_mode.is_none()
            && self.codec_specific.iter().all(|&v| v == 0)
    }

    /// Check whether any of the PCM fields is missing
    #[must_use]
    pub const fn has_none_field(&self) -> bool {
        self.codec_index.is_none()
            || self.sample_rate.is_none()
            || self.bits_per_sample.is_none()
            || self.channel_mode.is_none()
    }
}

impl core::fmt::Display for CodecConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.codec_index {
            Some(index) => write!(f, "{index}")?,
            None => f.write_str("<none>")?,
        }
        write!(
            f,
            " priority={} rate={} bits={} mode={} specific=[{}, {}, {}, {}]",
            self.priority.0,
            self.sample_rate,
            self.bits_per_sample,
            self.channel_mode,
            self.codec_specific[0],
            self.codec_specific[1],
            self.codec_specific[2],
            self.codec_specific[3],
        )
    }
}
