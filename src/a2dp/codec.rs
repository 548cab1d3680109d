//! Codec Plugins
//!
//! Every codec implements [`CodecPlugin`]: IE encode/decode, the capability
//! predicate and the negotiation algorithm. [`CodecVariant`] is the closed
//! set of plugins the registry can hold, and [`A2dpCodec`] pairs a plugin
//! with its lock-protected negotiation state.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use super::aac::AacCodec;
use super::config::CodecConfig;
use super::negotiation::{Negotiated, NegotiationRequest};
use super::offload::OffloadCapabilities;
use super::ota::{self, CodecInfo};
use super::sbc::SbcCodec;
use super::vendor::{AptxCodec, AptxHdCodec, LdacCodec};
use super::{A2dpError, CodecIndex, CodecPriority};
use crate::A2dpCodecOptions;
use crate::constants::{AVDT_CODEC_SIZE, OFFLOAD_CODEC_INFO_SIZE};

/// Codec Information Element of one codec
pub trait CodecInfoElement: Sized {
    /// Fixed length field of the element
    const LOSC: u8;

    /// Decode an element.
    ///
    /// With `is_capability` set, fields may carry several bits. Otherwise
    /// each order-significant field must carry exactly one.
    ///
    /// # Errors
    /// `InvalidParams` for a short buffer, `WrongCodec` for a foreign
    /// element, a field-specific error for an invalid configuration
    fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError>;

    /// Encode the element into a zero-padded codec info buffer
    ///
    /// # Errors
    /// `InvalidParams` if a mandatory field is empty
    fn build(&self) -> Result<CodecInfo, A2dpError>;
}

/// Codec plugin contract
pub trait CodecPlugin {
    /// Wire element handled by this plugin
    type Cie: CodecInfoElement + PartialEq;

    /// Codec index served by this plugin
    fn index(&self) -> CodecIndex;

    /// Local capability as a codec-independent record
    fn local_capability(&self) -> CodecConfig;

    /// Decode a peer element
    ///
    /// # Errors
    /// See [`CodecInfoElement::parse`]
    fn parse_info(&self, info: &[u8], is_capability: bool) -> Result<Self::Cie, A2dpError> {
        Self::Cie::parse(info, is_capability)
    }

    /// Check that a peer element shares at least one value per field with
    /// the local capability
    ///
    /// # Errors
    /// Parse errors, or the error of the first field without overlap
    fn matches_capability(&self, info: &[u8], is_capability: bool) -> Result<(), A2dpError>;

    /// Negotiate a configuration from the peer element and preferences
    ///
    /// # Errors
    /// Parse errors, or the error of the first field without overlap
    fn negotiate(&self, request: &NegotiationRequest<'_>) -> Result<Negotiated, A2dpError>;

    /// Compare two configurations field by field
    fn codec_equals(&self, a: &[u8], b: &[u8]) -> bool {
        match (self.parse_info(a, false), self.parse_info(b, false)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// PCM sample rate of a configuration, in Hz
    fn sample_rate_hz(&self, info: &[u8]) -> Option<u32>;

    /// PCM channel count of a configuration
    fn channel_count(&self, info: &[u8]) -> Option<u8>;

    /// Encoded bit rate of a configuration, in bits per second; `None`
    /// lets the encoder adapt
    fn encoded_bit_rate(&self, _info: &[u8], _config: &CodecConfig) -> Option<u32> {
        None
    }

    /// Codec-specific part of the offload parameter block
    fn offload_codec_specific(
        &self,
        _info: &[u8],
        _config: &CodecConfig,
    ) -> [u8; OFFLOAD_CODEC_INFO_SIZE] {
        [0; OFFLOAD_CODEC_INFO_SIZE]
    }
}

/// The closed set of codec plugins
#[derive(Debug, Clone)]
pub enum CodecVariant {
    /// SBC encoder
    SbcSource(SbcCodec),
    /// SBC decoder
    SbcSink(SbcCodec),
    /// AAC encoder
    Aac(AacCodec),
    /// aptX encoder
    Aptx(AptxCodec),
    /// aptX-HD encoder
    AptxHd(AptxHdCodec),
    /// LDAC encoder
    Ldac(LdacCodec),
}

macro_rules! dispatch {
    ($variant:expr, $plugin:ident => $body:expr) => {
        match $variant {
            CodecVariant::SbcSource($plugin) | CodecVariant::SbcSink($plugin) => $body,
            CodecVariant::Aac($plugin) => $body,
            CodecVariant::Aptx($plugin) => $body,
            CodecVariant::AptxHd($plugin) => $body,
            CodecVariant::Ldac($plugin) => $body,
        }
    };
}

impl CodecVariant {
    /// Create the plugin for `index`, picking capability tables from the
    /// offload verdict
    #[must_use]
    pub fn new(
        index: CodecIndex,
        offload: &OffloadCapabilities,
        options: &A2dpCodecOptions,
    ) -> Self {
        match index {
            CodecIndex::SourceSbc => Self::SbcSource(SbcCodec::source()),
            CodecIndex::SinkSbc => Self::SbcSink(SbcCodec::sink()),
            CodecIndex::SourceAac => Self::Aac(AacCodec::new(offload, options.pts_mode)),
            CodecIndex::SourceAptx => Self::Aptx(AptxCodec::new()),
            CodecIndex::SourceAptxHd => Self::AptxHd(AptxHdCodec::new()),
            CodecIndex::SourceLdac => Self::Ldac(LdacCodec::new()),
        }
    }

    /// Codec index
    #[must_use]
    pub fn index(&self) -> CodecIndex {
        dispatch!(self, p => p.index())
    }

    /// Local capability
    #[must_use]
    pub fn local_capability(&self) -> CodecConfig {
        dispatch!(self, p => p.local_capability())
    }

    /// See [`CodecPlugin::matches_capability`]
    ///
    /// # Errors
    /// See [`CodecPlugin::matches_capability`]
    pub fn matches_capability(&self, info: &[u8], is_capability: bool) -> Result<(), A2dpError> {
        dispatch!(self, p => p.matches_capability(info, is_capability))
    }

    /// See [`CodecPlugin::negotiate`]
    ///
    /// # Errors
    /// See [`CodecPlugin::negotiate`]
    pub fn negotiate(&self, request: &NegotiationRequest<'_>) -> Result<Negotiated, A2dpError> {
        dispatch!(self, p => p.negotiate(request))
    }

    /// See [`CodecPlugin::codec_equals`]
    #[must_use]
    pub fn codec_equals(&self, a: &[u8], b: &[u8]) -> bool {
        dispatch!(self, p => p.codec_equals(a, b))
    }

    /// See [`CodecPlugin::sample_rate_hz`]
    #[must_use]
    pub fn sample_rate_hz(&self, info: &[u8]) -> Option<u32> {
        dispatch!(self, p => p.sample_rate_hz(info))
    }

    /// See [`CodecPlugin::channel_count`]
    #[must_use]
    pub fn channel_count(&self, info: &[u8]) -> Option<u8> {
        dispatch!(self, p => p.channel_count(info))
    }

    /// See [`CodecPlugin::encoded_bit_rate`]
    #[must_use]
    pub fn encoded_bit_rate(&self, info: &[u8], config: &CodecConfig) -> Option<u32> {
        dispatch!(self, p => p.encoded_bit_rate(info, config))
    }

    fn offload_codec_specific(
        &self,
        info: &[u8],
        config: &CodecConfig,
    ) -> [u8; OFFLOAD_CODEC_INFO_SIZE] {
        dispatch!(self, p => p.offload_codec_specific(info, config))
    }
}

/// Restart flags reported by a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecUpdate {
    /// Encoded configuration to send to the peer
    pub result_codec_info: CodecInfo,
    /// PCM input format changed; the encoder must be restarted
    pub restart_input: bool,
    /// Stream must be reconfigured with the peer
    pub restart_output: bool,
    /// Reported configuration changed
    pub config_updated: bool,
}

impl CodecUpdate {
    /// Update that changes nothing
    #[must_use]
    pub const fn unchanged(result_codec_info: CodecInfo) -> Self {
        Self {
            result_codec_info,
            restart_input: false,
            restart_output: false,
            config_updated: false,
        }
    }
}

/// Parameters handed to the audio HAL when encoding is offloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffloadCodecInfo {
    /// Codec being offloaded
    pub codec_index: CodecIndex,
    /// PCM sample rate in Hz
    pub sample_rate_hz: u32,
    /// PCM sample width
    pub bits_per_sample: u8,
    /// PCM channel count
    pub channel_count: u8,
    /// Encoded bit rate in bits per second; 0 lets the encoder decide
    pub encoded_bit_rate: u32,
    /// Codec-specific block
    pub codec_specific: [u8; OFFLOAD_CODEC_INFO_SIZE],
}

/// Mutable negotiation state of one plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecState {
    /// Priority configured at construction; `DEFAULT` means computed
    pub default_priority: CodecPriority,
    /// Current priority
    pub priority: CodecPriority,
    /// Negotiated configuration
    pub config: CodecConfig,
    /// Capability shared with the last peer
    pub capability: CodecConfig,
    /// Local capability
    pub local_capability: CodecConfig,
    /// Values selectable with the last peer
    pub selectable_capability: CodecConfig,
    /// User preference
    pub user_config: CodecConfig,
    /// Audio-stream preference
    pub audio_config: CodecConfig,
    /// Last locally built configuration
    pub ota_config: CodecInfo,
    /// Last peer capability
    pub ota_peer_capability: CodecInfo,
    /// Last peer configuration
    pub ota_peer_config: CodecInfo,
}

impl CodecState {
    fn new(index: CodecIndex, local_capability: CodecConfig, default_priority: CodecPriority) -> Self {
        let mut state = Self {
            default_priority,
            priority: CodecPriority::DEFAULT,
            config: CodecConfig::for_codec(index),
            capability: CodecConfig::for_codec(index),
            local_capability,
            selectable_capability: CodecConfig::for_codec(index),
            user_config: CodecConfig::default(),
            audio_config: CodecConfig::default(),
            ota_config: [0; AVDT_CODEC_SIZE],
            ota_peer_capability: [0; AVDT_CODEC_SIZE],
            ota_peer_config: [0; AVDT_CODEC_SIZE],
        };
        state.set_priority(index, default_priority);
        state
    }

    fn set_priority(&mut self, index: CodecIndex, priority: CodecPriority) {
        self.priority = if priority == CodecPriority::DEFAULT {
            if self.default_priority == CodecPriority::DEFAULT {
                index.computed_default_priority()
            } else {
                self.default_priority
            }
        } else {
            priority
        };
        for record in [
            &mut self.config,
            &mut self.capability,
            &mut self.local_capability,
            &mut self.selectable_capability,
        ] {
            record.priority = self.priority;
        }
    }

    fn commit(&mut self, negotiated: &Negotiated, is_capability: bool) {
        self.config = negotiated.config.with_priority(self.priority);
        self.capability = negotiated.capability.with_priority(self.priority);
        self.selectable_capability = negotiated.selectable.with_priority(self.priority);
        self.ota_config = negotiated.ota_config;
        if is_capability {
            self.ota_peer_capability = negotiated.ota_peer;
        } else {
            self.ota_peer_config = negotiated.ota_peer;
        }
    }
}

/// A codec plugin and its negotiation state
pub struct A2dpCodec {
    variant: CodecVariant,
    state: Mutex<CriticalSectionRawMutex, RefCell<CodecState>>,
}

impl A2dpCodec {
    /// Create a plugin with the given configured priority
    #[must_use]
    pub fn new(variant: CodecVariant, priority: CodecPriority) -> Self {
        let index = variant.index();
        let state = CodecState::new(index, variant.local_capability(), priority);
        debug!("[A2DP] Created codec {} with priority {}", index, state.priority.0);
        Self {
            variant,
            state: Mutex::new(RefCell::new(state)),
        }
    }

    /// Plugin
    #[must_use]
    pub const fn variant(&self) -> &CodecVariant {
        &self.variant
    }

    /// Codec index
    #[must_use]
    pub fn index(&self) -> CodecIndex {
        self.variant.index()
    }

    /// Codec name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.index().name()
    }

    /// Snapshot of the whole state
    #[must_use]
    pub fn state(&self) -> CodecState {
        self.state.lock(|s| *s.borrow())
    }

    /// Current priority
    #[must_use]
    pub fn priority(&self) -> CodecPriority {
        self.state.lock(|s| s.borrow().priority)
    }

    /// Negotiated configuration
    #[must_use]
    pub fn config(&self) -> CodecConfig {
        self.state.lock(|s| s.borrow().config)
    }

    /// Capability shared with the last peer
    #[must_use]
    pub fn capability(&self) -> CodecConfig {
        self.state.lock(|s| s.borrow().capability)
    }

    /// Local capability
    #[must_use]
    pub fn local_capability(&self) -> CodecConfig {
        self.state.lock(|s| s.borrow().local_capability)
    }

    /// Values selectable with the last peer
    #[must_use]
    pub fn selectable_capability(&self) -> CodecConfig {
        self.state.lock(|s| s.borrow().selectable_capability)
    }

    /// User preference
    #[must_use]
    pub fn user_config(&self) -> CodecConfig {
        self.state.lock(|s| s.borrow().user_config)
    }

    /// Audio-stream preference
    #[must_use]
    pub fn audio_config(&self) -> CodecConfig {
        self.state.lock(|s| s.borrow().audio_config)
    }

    /// Last locally built configuration
    #[must_use]
    pub fn copy_out_ota_codec_config(&self) -> CodecInfo {
        self.state.lock(|s| s.borrow().ota_config)
    }

    /// Sample width of the negotiated configuration
    #[must_use]
    pub fn audio_bits_per_sample(&self) -> Option<u8> {
        self.config().bits_per_sample.bits()
    }

    /// Set the priority; `DEFAULT` falls back to the default priority
    pub fn set_codec_priority(&self, priority: CodecPriority) {
        let index = self.index();
        self.state.lock(|s| s.borrow_mut().set_priority(index, priority));
    }

    /// Reset the priority to the configured one, or the computed default
    pub fn set_default_codec_priority(&self) {
        self.set_codec_priority(CodecPriority::DEFAULT);
    }

    /// Check a peer element against the local capability
    ///
    /// # Errors
    /// See [`CodecPlugin::matches_capability`]
    pub fn matches_capability(&self, info: &[u8], is_capability: bool) -> Result<(), A2dpError> {
        self.variant.matches_capability(info, is_capability)
    }

    /// Negotiate against the peer element with the stored preferences
    ///
    /// # Errors
    /// Negotiation errors; the state is left untouched
    pub fn set_codec_config(&self, peer: &[u8], is_capability: bool) -> Result<CodecInfo, A2dpError> {
        self.state.lock(|s| {
            let mut state = s.borrow_mut();
            let (user, audio) = (state.user_config, state.audio_config);
            let negotiated = self.negotiate(peer, is_capability, &user, &audio)?;
            state.commit(&negotiated, is_capability);
            Ok(negotiated.ota_config)
        })
    }

    /// Negotiate with new user and audio preferences
    ///
    /// # Errors
    /// Negotiation errors; the state, including the previous preferences,
    /// is left untouched
    pub fn set_codec_user_config(
        &self,
        user: &CodecConfig,
        audio: &CodecConfig,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecUpdate, A2dpError> {
        self.state.lock(|s| {
            let mut state = s.borrow_mut();
            let negotiated = self.negotiate(peer, is_capability, user, audio)?;

            let old_config = state.config;
            let old_ota_config = state.ota_config;
            state.user_config = *user;
            state.audio_config = *audio;
            state.commit(&negotiated, is_capability);

            let restart_input = old_config.sample_rate != negotiated.config.sample_rate
                || old_config.bits_per_sample != negotiated.config.bits_per_sample
                || old_config.channel_mode != negotiated.config.channel_mode;
            // Only a previously built configuration can require a reconfiguration
            let restart_output = !ota::is_empty(&old_ota_config)
                && !self
                    .variant
                    .codec_equals(&old_ota_config, &negotiated.ota_config);

            Ok(CodecUpdate {
                result_codec_info: negotiated.ota_config,
                restart_input,
                restart_output,
                config_updated: restart_input || restart_output,
            })
        })
    }

    /// PCM sample rate of the negotiated configuration, in Hz
    #[must_use]
    pub fn track_sample_rate(&self) -> Option<u32> {
        self.variant.sample_rate_hz(&self.copy_out_ota_codec_config())
    }

    /// PCM channel count of the negotiated configuration
    #[must_use]
    pub fn track_channel_count(&self) -> Option<u8> {
        self.variant.channel_count(&self.copy_out_ota_codec_config())
    }

    /// Maximum encoded bit rate for a media MTU, for codecs that bound it
    #[must_use]
    pub fn max_bit_rate(&self, mtu: u16) -> Option<u32> {
        match &self.variant {
            CodecVariant::Aac(aac) => aac.compute_max_bit_rate(&self.copy_out_ota_codec_config(), mtu),
            _ => None,
        }
    }

    /// Offload parameter block for the negotiated configuration
    ///
    /// # Errors
    /// `InvalidParams` if no complete configuration has been negotiated
    pub fn offload_codec_info(&self) -> Result<OffloadCodecInfo, A2dpError> {
        let state = self.state();
        if state.config.has_none_field() || ota::is_empty(&state.ota_config) {
            return Err(A2dpError::InvalidParams);
        }
        let info = &state.ota_config;
        Ok(OffloadCodecInfo {
            codec_index: self.index(),
            sample_rate_hz: self
                .variant
                .sample_rate_hz(info)
                .ok_or(A2dpError::InvalidParams)?,
            bits_per_sample: state
                .config
                .bits_per_sample
                .bits()
                .unwrap_or(16),
            channel_count: self
                .variant
                .channel_count(info)
                .ok_or(A2dpError::InvalidParams)?,
            encoded_bit_rate: self
                .variant
                .encoded_bit_rate(info, &state.config)
                .unwrap_or(0),
            codec_specific: self.variant.offload_codec_specific(info, &state.config),
        })
    }

    fn negotiate(
        &self,
        peer: &[u8],
        is_capability: bool,
        user: &CodecConfig,
        audio: &CodecConfig,
    ) -> Result<Negotiated, A2dpError> {
        let request = NegotiationRequest {
            peer,
            is_capability,
            user,
            audio,
        };
        self.variant.negotiate(&request).map_err(|err| {
            error!("[A2DP] {}: cannot negotiate codec config: {}", self.name(), err);
            err
        })
    }
}

impl core::fmt::Debug for A2dpCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("A2dpCodec")
            .field("variant", &self.variant)
            .field("state", &self.state())
            .finish()
    }
}

impl core::fmt::Display for A2dpCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state();
        writeln!(f, "A2DP Codec: {} (priority {})", self.name(), state.priority.0)?;
        writeln!(f, "  Config: {}", state.config)?;
        writeln!(f, "  Local capability: {}", state.local_capability)?;
        writeln!(f, "  Selectable capability: {}", state.selectable_capability)?;
        writeln!(f, "  User config: {}", state.user_config)?;
        write!(f, "  Audio config: {}", state.audio_config)
    }
}
