//! MPEG-2/4 AAC Codec
//!
//! The AAC element is 9 octets (LOSC 8):
//!
//! ```text
//! [3] object type
//! [4] sampling frequency bits 7..0
//! [5] sampling frequency bits 15..12 | channel mode
//! [6] VBR flag | bit rate bits 22..16
//! [7] bit rate bits 15..8
//! [8] bit rate bits 7..0
//! ```
//!
//! The capability table is chosen once, at construction, from the offload
//! verdict for AAC: software encoding runs at 44.1 kHz and 320 kbps, the
//! offload path at 165 kbps and 48 kHz unless the controller handles
//! scrambling or 44.1 kHz.

use super::codec::{CodecInfoElement, CodecPlugin};
use super::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use super::negotiation::{
    Negotiated, NegotiationRequest, PcmFields, mask_to_values, select_bits_per_sample,
    select_field,
};
use super::offload::OffloadCapabilities;
use super::ota::{self, CodecInfo};
use super::{A2dpError, CodecIndex, CodecType};
use crate::constants::OFFLOAD_CODEC_INFO_SIZE;

/// AAC element length
pub const AAC_LOSC: u8 = 8;

/// Bit rate used by the software encoder
pub const AAC_DEFAULT_BIT_RATE: u32 = 320_000;
/// Lowest plausible peer bit rate; smaller values are treated as kbps
pub const AAC_MIN_BIT_RATE: u32 = 64_000;
/// Bit rate used by the offload encoder
pub const AAC_OFFLOAD_BIT_RATE: u32 = 165_000;

/// PCM samples per AAC frame for the LC object types
const AAC_LC_SAMPLES_PER_FRAME: u64 = 1024;

const VBR_MASK: u8 = 0x80;
const BIT_RATE_MASK: u32 = 0x007F_FFFF;
const CHANNEL_MASK: u8 = 0x0C;
const SAMPLING_FREQ_HIGH_MASK: u16 = 0xF000;

/// AAC Codec Information Element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacCie {
    /// Object type (bitfield)
    pub object_type: u8,
    /// Sampling frequency (bitfield)
    pub sample_rate: u16,
    /// Channel mode (bitfield)
    pub channel_mode: u8,
    /// Variable bit rate support
    pub variable_bit_rate: bool,
    /// Bit rate in bits per second (23 bits)
    pub bit_rate: u32,
}

impl AacCie {
    /// MPEG-2 AAC LC
    pub const OBJ_MPEG2_LC: u8 = 0x80;
    /// MPEG-4 AAC LC
    pub const OBJ_MPEG4_LC: u8 = 0x40;
    /// MPEG-4 AAC LTP
    pub const OBJ_MPEG4_LTP: u8 = 0x20;
    /// MPEG-4 AAC scalable
    pub const OBJ_MPEG4_SCALABLE: u8 = 0x10;

    /// 8000 Hz
    pub const SAMPLING_FREQ_8000: u16 = 0x0080;
    /// 11025 Hz
    pub const SAMPLING_FREQ_11025: u16 = 0x0040;
    /// 12000 Hz
    pub const SAMPLING_FREQ_12000: u16 = 0x0020;
    /// 16000 Hz
    pub const SAMPLING_FREQ_16000: u16 = 0x0010;
    /// 22050 Hz
    pub const SAMPLING_FREQ_22050: u16 = 0x0008;
    /// 24000 Hz
    pub const SAMPLING_FREQ_24000: u16 = 0x0004;
    /// 32000 Hz
    pub const SAMPLING_FREQ_32000: u16 = 0x0002;
    /// 44100 Hz
    pub const SAMPLING_FREQ_44100: u16 = 0x0001;
    /// 48000 Hz
    pub const SAMPLING_FREQ_48000: u16 = 0x8000;
    /// 64000 Hz
    pub const SAMPLING_FREQ_64000: u16 = 0x4000;
    /// 88200 Hz
    pub const SAMPLING_FREQ_88200: u16 = 0x2000;
    /// 96000 Hz
    pub const SAMPLING_FREQ_96000: u16 = 0x1000;

    /// Mono
    pub const CHANNEL_MONO: u8 = 0x08;
    /// Stereo
    pub const CHANNEL_STEREO: u8 = 0x04;

    /// Software encoder capability
    #[must_use]
    pub const fn software_caps(variable_bit_rate: bool) -> Self {
        Self {
            object_type: Self::OBJ_MPEG2_LC,
            sample_rate: Self::SAMPLING_FREQ_44100,
            channel_mode: Self::CHANNEL_STEREO,
            variable_bit_rate,
            bit_rate: AAC_DEFAULT_BIT_RATE,
        }
    }

    /// Offload encoder capability
    #[must_use]
    pub const fn offload_caps(sample_rate_44p1k: bool, variable_bit_rate: bool) -> Self {
        Self {
            object_type: Self::OBJ_MPEG2_LC,
            sample_rate: if sample_rate_44p1k {
                Self::SAMPLING_FREQ_44100
            } else {
                Self::SAMPLING_FREQ_48000
            },
            channel_mode: Self::CHANNEL_STEREO,
            variable_bit_rate,
            bit_rate: AAC_OFFLOAD_BIT_RATE,
        }
    }
}

impl CodecInfoElement for AacCie {
    const LOSC: u8 = AAC_LOSC;

    fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        ota::check_header(info, Self::LOSC, CodecType::Mpeg24Aac)?;

        let cie = Self {
            object_type: info[3],
            sample_rate: u16::from(info[4]) | (u16::from(info[5]) << 8 & SAMPLING_FREQ_HIGH_MASK),
            channel_mode: info[5] & CHANNEL_MASK,
            variable_bit_rate: info[6] & VBR_MASK != 0,
            bit_rate: u32::from_be_bytes([0, info[6], info[7], info[8]]) & BIT_RATE_MASK,
        };
        if is_capability {
            return Ok(cie);
        }

        if !ota::is_single_bit(u32::from(cie.object_type)) {
            return Err(A2dpError::BadObjType);
        }
        if !ota::is_single_bit(u32::from(cie.sample_rate)) {
            return Err(A2dpError::BadSampFreq);
        }
        if !ota::is_single_bit(u32::from(cie.channel_mode)) {
            return Err(A2dpError::BadChMode);
        }
        Ok(cie)
    }

    fn build(&self) -> Result<CodecInfo, A2dpError> {
        if self.object_type == 0 || self.sample_rate == 0 || self.channel_mode == 0 {
            return Err(A2dpError::InvalidParams);
        }

        let [_, high, mid, low] = (self.bit_rate & BIT_RATE_MASK).to_be_bytes();
        let [rate_high, rate_low] = self.sample_rate.to_be_bytes();

        let mut info = ota::new_info(Self::LOSC, CodecType::Mpeg24Aac);
        info[3] = self.object_type;
        info[4] = rate_low;
        info[5] = (rate_high & 0xF0) | (self.channel_mode & CHANNEL_MASK);
        info[6] = if self.variable_bit_rate { VBR_MASK } else { 0 } | high;
        info[7] = mid;
        info[8] = low;
        Ok(info)
    }
}

const SAMPLE_RATES: [(u16, SampleRate); 12] = [
    (AacCie::SAMPLING_FREQ_96000, SampleRate::HZ_96000),
    (AacCie::SAMPLING_FREQ_88200, SampleRate::HZ_88200),
    (AacCie::SAMPLING_FREQ_48000, SampleRate::HZ_48000),
    (AacCie::SAMPLING_FREQ_44100, SampleRate::HZ_44100),
    (AacCie::SAMPLING_FREQ_64000, SampleRate::NONE),
    (AacCie::SAMPLING_FREQ_32000, SampleRate::HZ_32000),
    (AacCie::SAMPLING_FREQ_24000, SampleRate::HZ_24000),
    (AacCie::SAMPLING_FREQ_22050, SampleRate::NONE),
    (AacCie::SAMPLING_FREQ_16000, SampleRate::HZ_16000),
    (AacCie::SAMPLING_FREQ_12000, SampleRate::NONE),
    (AacCie::SAMPLING_FREQ_11025, SampleRate::NONE),
    (AacCie::SAMPLING_FREQ_8000, SampleRate::HZ_8000),
];

/// Sampling frequencies the audio path can carry, best first
const PCM_SAMPLE_RATES: [(u16, SampleRate); 4] = [
    (AacCie::SAMPLING_FREQ_96000, SampleRate::HZ_96000),
    (AacCie::SAMPLING_FREQ_88200, SampleRate::HZ_88200),
    (AacCie::SAMPLING_FREQ_48000, SampleRate::HZ_48000),
    (AacCie::SAMPLING_FREQ_44100, SampleRate::HZ_44100),
];

const CHANNEL_MODES: [(u8, ChannelMode); 2] = [
    (AacCie::CHANNEL_STEREO, ChannelMode::STEREO),
    (AacCie::CHANNEL_MONO, ChannelMode::MONO),
];

/// Correct a peer bit rate announced in kbps, then bound it by `local`.
///
/// Values below [`AAC_MIN_BIT_RATE`] are scaled by 1000 once; a value
/// still below the minimum is ignored in favour of `local`.
#[must_use]
pub const fn correct_bit_rate(peer: u32, local: u32) -> u32 {
    let peer = if peer < AAC_MIN_BIT_RATE {
        peer * 1000
    } else {
        peer
    };
    if peer < AAC_MIN_BIT_RATE || local < peer {
        local
    } else {
        peer
    }
}

/// AAC plugin
#[derive(Debug, Clone)]
pub struct AacCodec {
    caps: AacCie,
    default_config: AacCie,
    bits_per_sample: BitsPerSample,
    pts_mode: bool,
}

impl AacCodec {
    /// Create the plugin; the capability table follows the offload verdict
    #[must_use]
    pub fn new(offload: &OffloadCapabilities, pts_mode: bool) -> Self {
        let vbr = offload.is_aac_vbr_supported();
        let caps = if offload.is_codec_enabled_in_offload(CodecIndex::SourceAac) {
            let sample_rate_44p1k =
                offload.is_scrambling_supported() || offload.is_44p1k_supported();
            info!(
                "[AAC] Offload capability, 44.1 kHz: {}, VBR: {}",
                sample_rate_44p1k, vbr
            );
            AacCie::offload_caps(sample_rate_44p1k, vbr)
        } else {
            info!("[AAC] Software capability, VBR: {}", vbr);
            AacCie::software_caps(vbr)
        };

        Self {
            caps,
            default_config: caps,
            bits_per_sample: BitsPerSample::BITS_16,
            pts_mode,
        }
    }

    /// Local capability element
    #[must_use]
    pub const fn caps(&self) -> &AacCie {
        &self.caps
    }

    /// Maximum bit rate that fits one AAC frame per media packet of `mtu`
    /// octets, for the LC object types
    #[must_use]
    pub fn compute_max_bit_rate(&self, info: &[u8], mtu: u16) -> Option<u32> {
        let cie = AacCie::parse(info, false).ok()?;
        if cie.object_type != AacCie::OBJ_MPEG2_LC && cie.object_type != AacCie::OBJ_MPEG4_LC {
            return None;
        }
        let hz = self.sample_rate_hz(info)?;
        let max = 8 * u64::from(mtu) * u64::from(hz) / AAC_LC_SAMPLES_PER_FRAME;
        u32::try_from(max).ok()
    }
}

impl CodecPlugin for AacCodec {
    type Cie = AacCie;

    fn index(&self) -> CodecIndex {
        CodecIndex::SourceAac
    }

    fn local_capability(&self) -> CodecConfig {
        CodecConfig::for_codec(CodecIndex::SourceAac)
            .with_sample_rate(mask_to_values(&SAMPLE_RATES, self.caps.sample_rate))
            .with_bits_per_sample(self.bits_per_sample)
            .with_channel_mode(mask_to_values(&CHANNEL_MODES, self.caps.channel_mode))
    }

    fn parse_info(&self, info: &[u8], is_capability: bool) -> Result<AacCie, A2dpError> {
        match AacCie::parse(info, is_capability) {
            Err(A2dpError::BadChMode) if self.pts_mode => Err(A2dpError::BadChannel),
            other => other,
        }
    }

    fn matches_capability(&self, info: &[u8], is_capability: bool) -> Result<(), A2dpError> {
        let peer = self.parse_info(info, is_capability)?;
        if self.caps.object_type & peer.object_type == 0 {
            return Err(A2dpError::BadObjType);
        }
        if self.caps.sample_rate & peer.sample_rate == 0 {
            return Err(A2dpError::BadSampFreq);
        }
        if self.caps.channel_mode & peer.channel_mode == 0 {
            return Err(A2dpError::NsChMode);
        }
        Ok(())
    }

    fn negotiate(&self, request: &NegotiationRequest<'_>) -> Result<Negotiated, A2dpError> {
        let peer = self.parse_info(request.peer, request.is_capability)?;
        let (caps, default) = (&self.caps, &self.default_config);

        let bit_rate = correct_bit_rate(peer.bit_rate, caps.bit_rate);
        if bit_rate != peer.bit_rate {
            debug!(
                "[AAC] Peer bit rate {} adjusted to {}",
                peer.bit_rate, bit_rate
            );
        }

        let sample_rate = select_field(
            &PCM_SAMPLE_RATES,
            caps.sample_rate & peer.sample_rate,
            request.user.sample_rate,
            request.audio.sample_rate,
            default.sample_rate,
        )
        .ok_or(A2dpError::BadSampFreq)?;

        let bits_per_sample = select_bits_per_sample(
            self.bits_per_sample,
            request.user,
            request.audio,
            self.bits_per_sample,
        )
        .ok_or(A2dpError::BadBitsPerSample)?;

        let channel_mode = select_field(
            &CHANNEL_MODES,
            caps.channel_mode & peer.channel_mode,
            request.user.channel_mode,
            request.audio.channel_mode,
            default.channel_mode,
        )
        .ok_or(A2dpError::BadChMode)?;

        let result = AacCie {
            object_type: caps.object_type,
            sample_rate: sample_rate.native,
            channel_mode: channel_mode.native,
            variable_bit_rate: caps.variable_bit_rate && peer.variable_bit_rate,
            bit_rate,
        };

        let (config, capability, selectable) = PcmFields {
            sample_rate: sample_rate.choice,
            bits_per_sample,
            channel_mode: channel_mode.choice,
        }
        .into_records(CodecIndex::SourceAac, request.user);

        Ok(Negotiated {
            config,
            capability,
            selectable,
            ota_config: result.build()?,
            ota_peer: peer.build()?,
        })
    }

    fn sample_rate_hz(&self, info: &[u8]) -> Option<u32> {
        let cie = AacCie::parse(info, false).ok()?;
        let hz = match cie.sample_rate {
            AacCie::SAMPLING_FREQ_8000 => 8_000,
            AacCie::SAMPLING_FREQ_11025 => 11_025,
            AacCie::SAMPLING_FREQ_12000 => 12_000,
            AacCie::SAMPLING_FREQ_16000 => 16_000,
            AacCie::SAMPLING_FREQ_22050 => 22_050,
            AacCie::SAMPLING_FREQ_24000 => 24_000,
            AacCie::SAMPLING_FREQ_32000 => 32_000,
            AacCie::SAMPLING_FREQ_44100 => 44_100,
            AacCie::SAMPLING_FREQ_48000 => 48_000,
            AacCie::SAMPLING_FREQ_64000 => 64_000,
            AacCie::SAMPLING_FREQ_88200 => 88_200,
            AacCie::SAMPLING_FREQ_96000 => 96_000,
            _ => return None,
        };
        Some(hz)
    }

    fn channel_count(&self, info: &[u8]) -> Option<u8> {
        let cie = AacCie::parse(info, false).ok()?;
        match cie.channel_mode {
            AacCie::CHANNEL_MONO => Some(1),
            AacCie::CHANNEL_STEREO => Some(2),
            _ => None,
        }
    }

    fn encoded_bit_rate(&self, info: &[u8], _config: &CodecConfig) -> Option<u32> {
        AacCie::parse(info, false).ok().map(|cie| cie.bit_rate)
    }

    fn offload_codec_specific(
        &self,
        info: &[u8],
        _config: &CodecConfig,
    ) -> [u8; OFFLOAD_CODEC_INFO_SIZE] {
        let mut block = [0u8; OFFLOAD_CODEC_INFO_SIZE];
        if let Ok(cie) = AacCie::parse(info, false) {
            block[0] = cie.object_type;
            block[1] = info[6];
        }
        block
    }
}
