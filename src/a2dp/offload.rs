//! Offload Capability Tracker
//!
//! Decides, once at startup, which codecs run on the controller's
//! hardware-offload path and which on host software encoders. The result is
//! an explicit [`OffloadCapabilities`] value handed to the codec registry and
//! consulted by each plugin when it is constructed.
//!
//! Three derivation modes:
//!
//! - **Audio HAL 2.0 (hybrid)**: per codec, offload when the controller
//!   supports it and the audio HAL lists it, software otherwise.
//! - **Audio HAL 1.0, offload enabled**: the codecs named in the offload
//!   capability string (`"sbc-aac-aptx"`) that the controller supports.
//! - **Audio HAL 1.0, offload disabled**: every source codec in software.

use heapless::String;

use super::{CodecIndex, CodecSet};
use crate::constants::MAX_OFFLOAD_CAPS_LENGTH;

/// Offload capability string meaning "no capability"
pub const OFFLOAD_CAPS_NONE: &str = "null";

/// Offload capability string tokens
const OFFLOAD_CAPS_TOKENS: [(&str, CodecIndex); 5] = [
    ("sbc", CodecIndex::SourceSbc),
    ("aac", CodecIndex::SourceAac),
    ("aptx", CodecIndex::SourceAptx),
    ("aptxhd", CodecIndex::SourceAptxHd),
    ("ldac", CodecIndex::SourceLdac),
];

/// System configuration the offload verdict is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffloadConfig {
    /// A2DP hardware offload is enabled
    pub offload_enabled: bool,
    /// Codecs the offload path supports, separated by `-`; `"null"` or empty
    /// for none
    pub offload_caps: String<MAX_OFFLOAD_CAPS_LENGTH>,
    /// Controller supports scrambling
    pub scrambling_supported: bool,
    /// Controller supports 44.1 kHz in offload
    pub sample_rate_44p1k_supported: bool,
    /// Audio HAL 2.0 is in use
    pub hal_2_0: bool,
    /// Codecs the controller's split-A2DP add-on features report; `None`
    /// when the controller reports no add-on features
    pub controller_codecs: Option<CodecSet>,
    /// Codecs the audio HAL enables for offload
    pub offload_codecs: CodecSet,
    /// AAC variable bit rate is enabled
    pub aac_vbr: bool,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            offload_enabled: false,
            offload_caps: String::new(),
            scrambling_supported: false,
            sample_rate_44p1k_supported: false,
            hal_2_0: false,
            controller_codecs: None,
            offload_codecs: CodecSet::EMPTY,
            aac_vbr: false,
        }
    }
}

/// Which codecs run in software and which in hardware offload
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffloadCapabilities {
    offload_capability: bool,
    offload: CodecSet,
    software: CodecSet,
    scrambling_supported: bool,
    sample_rate_44p1k_supported: bool,
    aac_vbr: bool,
    offload_caps: String<MAX_OFFLOAD_CAPS_LENGTH>,
}

impl OffloadCapabilities {
    /// Derive the verdict from the system configuration
    #[must_use]
    pub fn new(config: &OffloadConfig) -> Self {
        let controller = config.controller_codecs.unwrap_or(CodecSet::all_sources());
        if config.controller_codecs.is_none() {
            warn!("[A2DP] Controller has no add-on features");
        }

        let (offload_capability, offload, software) = if config.hal_2_0 {
            let offload = controller
                .intersect(config.offload_codecs)
                .intersect(CodecSet::all_sources());
            let software = CodecSet(CodecSet::all_sources().0 & !offload.0);
            (config.offload_enabled, offload, software)
        } else if config.offload_enabled {
            let offload = parse_offload_caps(&config.offload_caps).intersect(controller);
            (has_offload_caps(&config.offload_caps), offload, CodecSet::EMPTY)
        } else {
            (false, CodecSet::EMPTY, CodecSet::all_sources())
        };

        info!(
            "[A2DP] Offload status: {}, offload codecs: {=u8:#x}, software codecs: {=u8:#x}",
            config.offload_enabled,
            offload.0,
            software.0
        );

        Self {
            offload_capability,
            offload,
            software,
            scrambling_supported: config.scrambling_supported,
            sample_rate_44p1k_supported: config.sample_rate_44p1k_supported,
            aac_vbr: config.aac_vbr,
            offload_caps: config.offload_caps.clone(),
        }
    }

    /// Check if `index` can be used at all; the SBC sink is always enabled
    #[must_use]
    pub fn is_codec_enabled(&self, index: CodecIndex) -> bool {
        !index.is_source()
            || self.is_codec_enabled_in_offload(index)
            || self.is_codec_enabled_in_software(index)
    }

    /// Check if `index` runs on the offload path
    #[must_use]
    pub fn is_codec_enabled_in_offload(&self, index: CodecIndex) -> bool {
        self.offload_capability && self.offload.contains(index)
    }

    /// Check if `index` runs on a software encoder
    #[must_use]
    pub fn is_codec_enabled_in_software(&self, index: CodecIndex) -> bool {
        self.software.contains(index)
    }

    /// Controller supports scrambling
    #[must_use]
    pub const fn is_scrambling_supported(&self) -> bool {
        self.scrambling_supported
    }

    /// Controller supports 44.1 kHz in offload
    #[must_use]
    pub const fn is_44p1k_supported(&self) -> bool {
        self.sample_rate_44p1k_supported
    }

    /// AAC variable bit rate is enabled
    #[must_use]
    pub const fn is_aac_vbr_supported(&self) -> bool {
        self.aac_vbr
    }

    /// Offload capability string as configured
    #[must_use]
    pub fn offload_caps(&self) -> &str {
        &self.offload_caps
    }
}

fn has_offload_caps(caps: &str) -> bool {
    !caps.is_empty() && caps != OFFLOAD_CAPS_NONE
}

fn parse_offload_caps(caps: &str) -> CodecSet {
    if !has_offload_caps(caps) {
        return CodecSet::EMPTY;
    }
    caps.split('-').fold(CodecSet::EMPTY, |set, token| {
        match OFFLOAD_CAPS_TOKENS.iter().find(|(name, _)| *name == token) {
            Some(&(_, index)) => set.with(index),
            None => {
                debug!("[A2DP] Ignoring offload capability token {}", token);
                set
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(s: &str) -> String<MAX_OFFLOAD_CAPS_LENGTH> {
        String::try_from(s).unwrap()
    }

    #[test]
    fn test_software_mode_enables_every_source() {
        let offload = OffloadCapabilities::new(&OffloadConfig::default());
        for index in CodecIndex::ALL {
            assert!(offload.is_codec_enabled(index));
            assert!(!offload.is_codec_enabled_in_offload(index));
        }
        assert!(offload.is_codec_enabled_in_software(CodecIndex::SourceLdac));
        assert!(!offload.is_codec_enabled_in_software(CodecIndex::SinkSbc));
    }

    #[test]
    fn test_hal_1_0_offload_tokens() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            offload_enabled: true,
            offload_caps: caps("sbc-aac-aptxadaptive-ldac"),
            controller_codecs: Some(CodecSet::from_indices(&[
                CodecIndex::SourceSbc,
                CodecIndex::SourceAac,
            ])),
            ..OffloadConfig::default()
        });

        assert!(offload.is_codec_enabled_in_offload(CodecIndex::SourceSbc));
        assert!(offload.is_codec_enabled_in_offload(CodecIndex::SourceAac));
        // Controller does not support LDAC offload
        assert!(!offload.is_codec_enabled(CodecIndex::SourceLdac));
        assert!(!offload.is_codec_enabled(CodecIndex::SourceAptx));
        assert!(offload.is_codec_enabled(CodecIndex::SinkSbc));
        assert_eq!(offload.offload_caps(), "sbc-aac-aptxadaptive-ldac");
    }

    #[test]
    fn test_hal_1_0_null_caps() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            offload_enabled: true,
            offload_caps: caps(OFFLOAD_CAPS_NONE),
            ..OffloadConfig::default()
        });
        for index in CodecIndex::ALL.iter().filter(|index| index.is_source()) {
            assert!(!offload.is_codec_enabled(*index));
        }
    }

    #[test]
    fn test_hal_2_0_hybrid() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            offload_enabled: true,
            hal_2_0: true,
            offload_codecs: CodecSet::from_indices(&[CodecIndex::SourceSbc, CodecIndex::SourceAptx]),
            controller_codecs: Some(CodecSet::from_indices(&[
                CodecIndex::SourceSbc,
                CodecIndex::SourceAac,
            ])),
            ..OffloadConfig::default()
        });

        assert!(offload.is_codec_enabled_in_offload(CodecIndex::SourceSbc));
        assert!(!offload.is_codec_enabled_in_software(CodecIndex::SourceSbc));
        // Listed by the HAL but not supported by the controller
        assert!(!offload.is_codec_enabled_in_offload(CodecIndex::SourceAptx));
        assert!(offload.is_codec_enabled_in_software(CodecIndex::SourceAptx));
        assert!(offload.is_codec_enabled_in_software(CodecIndex::SourceAac));
    }

    #[test]
    fn test_hal_2_0_offload_disabled() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            offload_enabled: false,
            hal_2_0: true,
            offload_codecs: CodecSet::from_indices(&[CodecIndex::SourceAac]),
            ..OffloadConfig::default()
        });
        assert!(!offload.is_codec_enabled_in_offload(CodecIndex::SourceAac));
        assert!(!offload.is_codec_enabled_in_software(CodecIndex::SourceAac));
        assert!(!offload.is_codec_enabled(CodecIndex::SourceAac));
        assert!(offload.is_codec_enabled(CodecIndex::SourceSbc));
    }

    #[test]
    fn test_flags() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            scrambling_supported: true,
            aac_vbr: true,
            ..OffloadConfig::default()
        });
        assert!(offload.is_scrambling_supported());
        assert!(!offload.is_44p1k_supported());
        assert!(offload.is_aac_vbr_supported());
    }
}
