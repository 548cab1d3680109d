//! SBC (Sub-band Coding) Codec
//!
//! SBC is the mandatory A2DP codec. The element is 7 octets:
//!
//! ```text
//! [3] sampling frequency << 4 | channel mode
//! [4] block length << 4 | subbands << 2 | allocation method
//! [5] minimum bitpool
//! [6] maximum bitpool
//! ```

use super::codec::{CodecInfoElement, CodecPlugin};
use super::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use super::negotiation::{
    Negotiated, NegotiationRequest, PcmFields, mask_to_values, select_bits_per_sample,
    select_field, select_native,
};
use super::ota::{self, CodecInfo};
use super::{A2dpError, CodecIndex, CodecType};
use crate::constants::OFFLOAD_CODEC_INFO_SIZE;

/// SBC element length
pub const SBC_LOSC: u8 = 6;

/// Lowest bitpool value allowed on the wire
pub const SBC_MIN_BITPOOL: u8 = 2;
/// Highest bitpool value allowed on the wire
pub const SBC_MAX_BITPOOL: u8 = 250;
/// Highest bitpool value offered locally
pub const SBC_MAX_BITPOOL_LOCAL: u8 = 53;

/// SBC Sampling Frequency Support (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSamplingFrequency(pub u8);

impl SbcSamplingFrequency {
    /// 16000 Hz
    pub const HZ_16000: u8 = 0x08;
    /// 32000 Hz
    pub const HZ_32000: u8 = 0x04;
    /// 44100 Hz
    pub const HZ_44100: u8 = 0x02;
    /// 48000 Hz
    pub const HZ_48000: u8 = 0x01;

    /// Create with standard frequencies (44.1kHz and 48kHz)
    #[must_use]
    pub const fn standard() -> Self {
        Self(Self::HZ_44100 | Self::HZ_48000)
    }
}

/// SBC Channel Mode Support (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcChannelMode(pub u8);

impl SbcChannelMode {
    /// Mono
    pub const MONO: u8 = 0x08;
    /// Dual Channel
    pub const DUAL_CHANNEL: u8 = 0x04;
    /// Stereo
    pub const STEREO: u8 = 0x02;
    /// Joint Stereo
    pub const JOINT_STEREO: u8 = 0x01;

    /// Create with all modes supported
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::MONO | Self::DUAL_CHANNEL | Self::STEREO | Self::JOINT_STEREO)
    }
}

/// SBC Block Length Support (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcBlockLength(pub u8);

impl SbcBlockLength {
    /// 4 blocks
    pub const BLOCKS_4: u8 = 0x08;
    /// 8 blocks
    pub const BLOCKS_8: u8 = 0x04;
    /// 12 blocks
    pub const BLOCKS_12: u8 = 0x02;
    /// 16 blocks
    pub const BLOCKS_16: u8 = 0x01;

    /// Create with all block lengths supported
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::BLOCKS_4 | Self::BLOCKS_8 | Self::BLOCKS_12 | Self::BLOCKS_16)
    }
}

/// SBC Subbands Support (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSubbands(pub u8);

impl SbcSubbands {
    /// 4 subbands
    pub const SUBBANDS_4: u8 = 0x02;
    /// 8 subbands
    pub const SUBBANDS_8: u8 = 0x01;

    /// Create with all subbands supported
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SUBBANDS_4 | Self::SUBBANDS_8)
    }
}

/// SBC Allocation Method Support (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcAllocationMethod(pub u8);

impl SbcAllocationMethod {
    /// SNR allocation method
    pub const SNR: u8 = 0x02;
    /// Loudness allocation method
    pub const LOUDNESS: u8 = 0x01;

    /// Create with all allocation methods supported
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SNR | Self::LOUDNESS)
    }
}

/// SBC Codec Information Element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcCie {
    /// Sampling frequency support (bitfield)
    pub sampling_frequencies: SbcSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_modes: SbcChannelMode,
    /// Block length support (bitfield)
    pub block_lengths: SbcBlockLength,
    /// Subbands support (bitfield)
    pub subbands: SbcSubbands,
    /// Allocation method support (bitfield)
    pub allocation_methods: SbcAllocationMethod,
    /// Minimum bitpool value (2-250)
    pub min_bitpool: u8,
    /// Maximum bitpool value (2-250)
    pub max_bitpool: u8,
}

impl SbcCie {
    /// Local source capability
    pub const SOURCE_CAPS: Self = Self {
        sampling_frequencies: SbcSamplingFrequency(SbcSamplingFrequency::HZ_44100),
        channel_modes: SbcChannelMode(
            SbcChannelMode::MONO
                | SbcChannelMode::DUAL_CHANNEL
                | SbcChannelMode::STEREO
                | SbcChannelMode::JOINT_STEREO,
        ),
        block_lengths: SbcBlockLength::all(),
        subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
        allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
        min_bitpool: SBC_MIN_BITPOOL,
        max_bitpool: SBC_MAX_BITPOOL_LOCAL,
    };

    /// Local sink capability
    pub const SINK_CAPS: Self = Self {
        sampling_frequencies: SbcSamplingFrequency::standard(),
        channel_modes: SbcChannelMode::all(),
        block_lengths: SbcBlockLength::all(),
        subbands: SbcSubbands::all(),
        allocation_methods: SbcAllocationMethod::all(),
        min_bitpool: SBC_MIN_BITPOOL,
        max_bitpool: SBC_MAX_BITPOOL_LOCAL,
    };

    /// Preferred configuration
    pub const DEFAULT_CONFIG: Self = Self {
        sampling_frequencies: SbcSamplingFrequency(SbcSamplingFrequency::HZ_44100),
        channel_modes: SbcChannelMode(SbcChannelMode::JOINT_STEREO),
        block_lengths: SbcBlockLength(SbcBlockLength::BLOCKS_16),
        subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
        allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
        min_bitpool: SBC_MIN_BITPOOL,
        max_bitpool: SBC_MAX_BITPOOL_LOCAL,
    };
}

impl CodecInfoElement for SbcCie {
    const LOSC: u8 = SBC_LOSC;

    fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        ota::check_header(info, Self::LOSC, CodecType::Sbc)?;

        let cie = Self {
            sampling_frequencies: SbcSamplingFrequency(info[3] >> 4),
            channel_modes: SbcChannelMode(info[3] & 0x0F),
            block_lengths: SbcBlockLength(info[4] >> 4),
            subbands: SbcSubbands((info[4] >> 2) & 0x03),
            allocation_methods: SbcAllocationMethod(info[4] & 0x03),
            min_bitpool: info[5],
            max_bitpool: info[6],
        };

        if !(SBC_MIN_BITPOOL..=SBC_MAX_BITPOOL).contains(&cie.min_bitpool) {
            return Err(A2dpError::BadMinBitpool);
        }
        if !(SBC_MIN_BITPOOL..=SBC_MAX_BITPOOL).contains(&cie.max_bitpool)
            || cie.max_bitpool < cie.min_bitpool
        {
            return Err(A2dpError::BadMaxBitpool);
        }
        if is_capability {
            return Ok(cie);
        }

        if !ota::is_single_bit(u32::from(cie.sampling_frequencies.0)) {
            return Err(A2dpError::BadSampFreq);
        }
        if !ota::is_single_bit(u32::from(cie.channel_modes.0)) {
            return Err(A2dpError::BadChMode);
        }
        if !ota::is_single_bit(u32::from(cie.block_lengths.0)) {
            return Err(A2dpError::BadBlockLen);
        }
        if !ota::is_single_bit(u32::from(cie.subbands.0)) {
            return Err(A2dpError::BadSubbands);
        }
        if !ota::is_single_bit(u32::from(cie.allocation_methods.0)) {
            return Err(A2dpError::BadAllocMethod);
        }
        Ok(cie)
    }

    fn build(&self) -> Result<CodecInfo, A2dpError> {
        if self.sampling_frequencies.0 == 0
            || self.channel_modes.0 == 0
            || self.block_lengths.0 == 0
            || self.subbands.0 == 0
            || self.allocation_methods.0 == 0
        {
            return Err(A2dpError::InvalidParams);
        }

        let mut info = ota::new_info(Self::LOSC, CodecType::Sbc);
        info[3] = (self.sampling_frequencies.0 << 4) | (self.channel_modes.0 & 0x0F);
        info[4] = (self.block_lengths.0 << 4)
            | ((self.subbands.0 & 0x03) << 2)
            | (self.allocation_methods.0 & 0x03);
        info[5] = self.min_bitpool;
        info[6] = self.max_bitpool;
        Ok(info)
    }
}

const SAMPLE_RATES: [(u8, SampleRate); 4] = [
    (SbcSamplingFrequency::HZ_48000, SampleRate::HZ_48000),
    (SbcSamplingFrequency::HZ_44100, SampleRate::HZ_44100),
    (SbcSamplingFrequency::HZ_32000, SampleRate::HZ_32000),
    (SbcSamplingFrequency::HZ_16000, SampleRate::HZ_16000),
];

// Joint stereo, stereo and dual channel are all "stereo" to the audio path
const CHANNEL_MODES: [(u8, ChannelMode); 4] = [
    (SbcChannelMode::JOINT_STEREO, ChannelMode::STEREO),
    (SbcChannelMode::STEREO, ChannelMode::STEREO),
    (SbcChannelMode::DUAL_CHANNEL, ChannelMode::STEREO),
    (SbcChannelMode::MONO, ChannelMode::MONO),
];

const BLOCK_LENGTHS: [u8; 4] = [
    SbcBlockLength::BLOCKS_16,
    SbcBlockLength::BLOCKS_12,
    SbcBlockLength::BLOCKS_8,
    SbcBlockLength::BLOCKS_4,
];

const SUBBANDS: [u8; 2] = [SbcSubbands::SUBBANDS_8, SbcSubbands::SUBBANDS_4];

const ALLOCATION_METHODS: [u8; 2] = [SbcAllocationMethod::LOUDNESS, SbcAllocationMethod::SNR];

/// SBC plugin, source or sink
#[derive(Debug, Clone)]
pub struct SbcCodec {
    index: CodecIndex,
    caps: SbcCie,
    default_config: SbcCie,
}

impl SbcCodec {
    /// SBC encoder
    #[must_use]
    pub const fn source() -> Self {
        Self {
            index: CodecIndex::SourceSbc,
            caps: SbcCie::SOURCE_CAPS,
            default_config: SbcCie::DEFAULT_CONFIG,
        }
    }

    /// SBC decoder
    #[must_use]
    pub const fn sink() -> Self {
        Self {
            index: CodecIndex::SinkSbc,
            caps: SbcCie::SINK_CAPS,
            default_config: SbcCie::DEFAULT_CONFIG,
        }
    }

    /// Local capability element
    #[must_use]
    pub const fn caps(&self) -> &SbcCie {
        &self.caps
    }
}

impl CodecPlugin for SbcCodec {
    type Cie = SbcCie;

    fn index(&self) -> CodecIndex {
        self.index
    }

    fn local_capability(&self) -> CodecConfig {
        CodecConfig::for_codec(self.index)
            .with_sample_rate(mask_to_values(&SAMPLE_RATES, self.caps.sampling_frequencies.0))
            .with_bits_per_sample(BitsPerSample::BITS_16)
            .with_channel_mode(mask_to_values(&CHANNEL_MODES, self.caps.channel_modes.0))
    }

    fn matches_capability(&self, info: &[u8], is_capability: bool) -> Result<(), A2dpError> {
        let peer = SbcCie::parse(info, is_capability)?;
        if self.caps.sampling_frequencies.0 & peer.sampling_frequencies.0 == 0 {
            return Err(A2dpError::NsSampFreq);
        }
        if self.caps.channel_modes.0 & peer.channel_modes.0 == 0 {
            return Err(A2dpError::NsChMode);
        }
        Ok(())
    }

    fn negotiate(&self, request: &NegotiationRequest<'_>) -> Result<Negotiated, A2dpError> {
        let peer = SbcCie::parse(request.peer, request.is_capability)?;
        let (caps, default) = (&self.caps, &self.default_config);

        let sample_rate = select_field(
            &SAMPLE_RATES,
            caps.sampling_frequencies.0 & peer.sampling_frequencies.0,
            request.user.sample_rate,
            request.audio.sample_rate,
            default.sampling_frequencies.0,
        )
        .ok_or(A2dpError::BadSampFreq)?;

        let bits_per_sample = select_bits_per_sample(
            BitsPerSample::BITS_16,
            request.user,
            request.audio,
            BitsPerSample::BITS_16,
        )
        .ok_or(A2dpError::BadBitsPerSample)?;

        let channel_mode = select_field(
            &CHANNEL_MODES,
            caps.channel_modes.0 & peer.channel_modes.0,
            request.user.channel_mode,
            request.audio.channel_mode,
            default.channel_modes.0,
        )
        .ok_or(A2dpError::BadChMode)?;

        let block_length = select_native(
            &BLOCK_LENGTHS,
            caps.block_lengths.0 & peer.block_lengths.0,
            default.block_lengths.0,
        )
        .ok_or(A2dpError::BadBlockLen)?;

        let subbands = select_native(
            &SUBBANDS,
            caps.subbands.0 & peer.subbands.0,
            default.subbands.0,
        )
        .ok_or(A2dpError::BadSubbands)?;

        let allocation_method = select_native(
            &ALLOCATION_METHODS,
            caps.allocation_methods.0 & peer.allocation_methods.0,
            default.allocation_methods.0,
        )
        .ok_or(A2dpError::BadAllocMethod)?;

        let min_bitpool = caps.min_bitpool.max(peer.min_bitpool);
        let max_bitpool = caps.max_bitpool.min(peer.max_bitpool);
        if min_bitpool > max_bitpool {
            return Err(A2dpError::BadMaxBitpool);
        }

        let result = SbcCie {
            sampling_frequencies: SbcSamplingFrequency(sample_rate.native),
            channel_modes: SbcChannelMode(channel_mode.native),
            block_lengths: SbcBlockLength(block_length),
            subbands: SbcSubbands(subbands),
            allocation_methods: SbcAllocationMethod(allocation_method),
            min_bitpool,
            max_bitpool,
        };

        let (config, capability, selectable) = PcmFields {
            sample_rate: sample_rate.choice,
            bits_per_sample,
            channel_mode: channel_mode.choice,
        }
        .into_records(self.index, request.user);

        Ok(Negotiated {
            config,
            capability,
            selectable,
            ota_config: result.build()?,
            ota_peer: peer.build()?,
        })
    }

    fn sample_rate_hz(&self, info: &[u8]) -> Option<u32> {
        let cie = SbcCie::parse(info, false).ok()?;
        mask_to_values(&SAMPLE_RATES, cie.sampling_frequencies.0).hz()
    }

    fn channel_count(&self, info: &[u8]) -> Option<u8> {
        let cie = SbcCie::parse(info, false).ok()?;
        mask_to_values(&CHANNEL_MODES, cie.channel_modes.0).channel_count()
    }

    fn offload_codec_specific(
        &self,
        info: &[u8],
        _config: &CodecConfig,
    ) -> [u8; OFFLOAD_CODEC_INFO_SIZE] {
        // Raw SBC parameter octets
        let mut block = [0u8; OFFLOAD_CODEC_INFO_SIZE];
        if let Some(params) = info.get(3..=6) {
            block[..params.len()].copy_from_slice(params);
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(cie: SbcCie) -> CodecInfo {
        cie.build().unwrap()
    }

    fn negotiate(codec: &SbcCodec, info: &[u8], user: &CodecConfig) -> Result<Negotiated, A2dpError> {
        codec.negotiate(&NegotiationRequest {
            peer: info,
            is_capability: true,
            user,
            audio: &CodecConfig::default(),
        })
    }

    #[test]
    fn test_sbc_encoding() {
        let info = peer(SbcCie::DEFAULT_CONFIG);
        assert_eq!(&info[..7], &[0x06, 0x00, 0x00, 0x21, 0x15, 2, 53]);
        assert_eq!(SbcCie::parse(&info, false), Ok(SbcCie::DEFAULT_CONFIG));
    }

    #[test]
    fn test_sbc_parse_rejects_multiple_bits_in_config() {
        let info = peer(SbcCie::SINK_CAPS);
        assert_eq!(SbcCie::parse(&info, true), Ok(SbcCie::SINK_CAPS));
        assert_eq!(SbcCie::parse(&info, false), Err(A2dpError::BadSampFreq));

        let mut info = peer(SbcCie::DEFAULT_CONFIG);
        info[4] = 0x35; // two block lengths
        assert_eq!(SbcCie::parse(&info, false), Err(A2dpError::BadBlockLen));
    }

    #[test]
    fn test_sbc_parse_bitpool_range() {
        let mut info = peer(SbcCie::DEFAULT_CONFIG);
        info[5] = 1;
        assert_eq!(SbcCie::parse(&info, true), Err(A2dpError::BadMinBitpool));

        let mut info = peer(SbcCie::DEFAULT_CONFIG);
        info[5] = 40;
        info[6] = 30;
        assert_eq!(SbcCie::parse(&info, true), Err(A2dpError::BadMaxBitpool));
    }

    #[test]
    fn test_sbc_negotiation_picks_best_values() {
        let codec = SbcCodec::source();
        let info = peer(SbcCie::SINK_CAPS);
        let negotiated = negotiate(&codec, &info, &CodecConfig::default()).unwrap();

        let result = SbcCie::parse(&negotiated.ota_config, false).unwrap();
        assert_eq!(result, SbcCie::DEFAULT_CONFIG);
        assert_eq!(negotiated.config.sample_rate, SampleRate::HZ_44100);
        assert_eq!(negotiated.config.channel_mode, ChannelMode::STEREO);
        assert_eq!(negotiated.config.bits_per_sample, BitsPerSample::BITS_16);
        assert_eq!(
            negotiated.selectable.channel_mode,
            ChannelMode::MONO | ChannelMode::STEREO
        );
        assert_eq!(negotiated.ota_peer, info);
    }

    #[test]
    fn test_sbc_user_mono() {
        let codec = SbcCodec::source();
        let user = CodecConfig::for_codec(CodecIndex::SourceSbc).with_channel_mode(ChannelMode::MONO);
        let negotiated = negotiate(&codec, &peer(SbcCie::SINK_CAPS), &user).unwrap();
        let result = SbcCie::parse(&negotiated.ota_config, false).unwrap();
        assert_eq!(result.channel_modes.0, SbcChannelMode::MONO);
        assert_eq!(negotiated.capability.channel_mode, ChannelMode::MONO);
    }

    #[test]
    fn test_sbc_bitpool_intersection() {
        let codec = SbcCodec::source();
        let mut cie = SbcCie::SINK_CAPS;
        cie.min_bitpool = 20;
        cie.max_bitpool = 35;
        let negotiated = negotiate(&codec, &peer(cie), &CodecConfig::default()).unwrap();
        let result = SbcCie::parse(&negotiated.ota_config, false).unwrap();
        assert_eq!((result.min_bitpool, result.max_bitpool), (20, 35));

        cie.min_bitpool = 60;
        cie.max_bitpool = 80;
        assert_eq!(
            negotiate(&codec, &peer(cie), &CodecConfig::default()),
            Err(A2dpError::BadMaxBitpool)
        );
    }

    #[test]
    fn test_sbc_no_common_subbands() {
        let codec = SbcCodec::source();
        let mut cie = SbcCie::SINK_CAPS;
        cie.subbands = SbcSubbands(SbcSubbands::SUBBANDS_4);
        assert_eq!(
            negotiate(&codec, &peer(cie), &CodecConfig::default()),
            Err(A2dpError::BadSubbands)
        );
    }

    #[test]
    fn test_sbc_matches_capability() {
        let codec = SbcCodec::source();
        assert_eq!(codec.matches_capability(&peer(SbcCie::SINK_CAPS), true), Ok(()));

        let mut cie = SbcCie::SINK_CAPS;
        cie.sampling_frequencies = SbcSamplingFrequency(SbcSamplingFrequency::HZ_48000);
        assert_eq!(
            codec.matches_capability(&peer(cie), true),
            Err(A2dpError::NsSampFreq)
        );

        // Only sampling frequency and channel mode gate the match
        let mut cie = SbcCie::SINK_CAPS;
        cie.subbands = SbcSubbands(SbcSubbands::SUBBANDS_4);
        assert_eq!(codec.matches_capability(&peer(cie), true), Ok(()));

        let sink = SbcCodec::sink();
        let mut cie = SbcCie::SINK_CAPS;
        cie.channel_modes = SbcChannelMode(0);
        assert_eq!(
            sink.matches_capability(&peer(cie), true),
            Err(A2dpError::NsChMode)
        );
    }

    #[test]
    fn test_sbc_track_and_offload() {
        let codec = SbcCodec::source();
        let info = peer(SbcCie::DEFAULT_CONFIG);
        assert_eq!(codec.sample_rate_hz(&info), Some(44_100));
        assert_eq!(codec.channel_count(&info), Some(2));
        let block = codec.offload_codec_specific(&info, &CodecConfig::default());
        assert_eq!(&block[..4], &[0x21, 0x15, 2, 53]);
    }
}
