//! Codec Registry
//!
//! [`A2dpCodecs`] owns every enabled codec plugin, keeps the source and sink
//! plugins ordered by priority and tracks the current codec. All negotiation
//! entry points of the A2DP source go through it.
//!
//! A failing call never leaves the current codec half-updated: the previous
//! current codec, and any priority the call touched, are restored.

use core::cell::RefCell;
use core::cmp::Reverse;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::{FnvIndexMap, Vec};

use super::codec::{A2dpCodec, CodecUpdate, CodecVariant};
use super::config::CodecConfig;
use super::offload::OffloadCapabilities;
use super::ota::{self, CodecInfo};
use super::{A2dpError, CodecConfigList, CodecIndex, CodecPriority, CodecType, vendor};
use crate::constants::MAX_CODECS;
use crate::{A2dpCodecOptions, BluetoothAddress};

/// Ordered list of codec indices
pub type CodecIndexList = Vec<CodecIndex, MAX_CODECS>;

/// Source codec index an element belongs to, by codec type and, for vendor
/// codecs, vendor ID and vendor codec ID
#[must_use]
pub fn source_codec_index(info: &[u8]) -> Option<CodecIndex> {
    match ota::codec_type(info)? {
        CodecType::Sbc => Some(CodecIndex::SourceSbc),
        CodecType::Mpeg24Aac => Some(CodecIndex::SourceAac),
        CodecType::VendorSpecific => vendor::source_codec_index(info),
        CodecType::Mpeg12Audio | CodecType::Atrac => None,
    }
}

/// Sink codec index an element belongs to
#[must_use]
pub fn sink_codec_index(info: &[u8]) -> Option<CodecIndex> {
    match ota::codec_type(info)? {
        CodecType::Sbc => Some(CodecIndex::SinkSbc),
        _ => None,
    }
}

/// Peer the configuration is negotiated with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerParams {
    /// Peer address
    pub addr: BluetoothAddress,
    /// Peer is known to work best with the mandatory codec (SBC)
    pub prefers_mandatory_codec: bool,
}

/// Snapshot of the registry for upper layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecReport {
    /// Configuration of the current codec
    pub current: Option<CodecConfig>,
    /// Local capability of every source codec, by priority
    pub local_capabilities: CodecConfigList,
    /// Capability selectable with the peer of every source codec that has
    /// one, by priority
    pub selectable_capabilities: CodecConfigList,
}

#[derive(Debug)]
struct RegistryState {
    ordered_source: CodecIndexList,
    ordered_sink: CodecIndexList,
    current: Option<CodecIndex>,
}

impl RegistryState {
    const fn new() -> Self {
        Self {
            ordered_source: Vec::new(),
            ordered_sink: Vec::new(),
            current: None,
        }
    }
}

/// Codec registry
pub struct A2dpCodecs {
    priorities: FnvIndexMap<CodecIndex, CodecPriority, MAX_CODECS>,
    offload: OffloadCapabilities,
    options: A2dpCodecOptions,
    indexed: FnvIndexMap<CodecIndex, A2dpCodec, MAX_CODECS>,
    disabled: FnvIndexMap<CodecIndex, A2dpCodec, MAX_CODECS>,
    state: Mutex<CriticalSectionRawMutex, RefCell<RegistryState>>,
}

impl A2dpCodecs {
    /// Create an empty registry.
    ///
    /// `priorities` holds configured per-codec priorities; entries without a
    /// codec index are ignored. Call [`A2dpCodecs::init`] to create the
    /// plugins.
    #[must_use]
    pub fn new(
        priorities: &[CodecConfig],
        offload: OffloadCapabilities,
        options: A2dpCodecOptions,
    ) -> Self {
        let mut map = FnvIndexMap::new();
        for config in priorities {
            if let Some(index) = config.codec_index {
                map.insert(index, config.priority).ok();
            }
        }

        Self {
            priorities: map,
            offload,
            options,
            indexed: FnvIndexMap::new(),
            disabled: FnvIndexMap::new(),
            state: Mutex::new(RefCell::new(RegistryState::new())),
        }
    }

    /// Create the plugins.
    ///
    /// Codecs enabled neither in software nor in offload are skipped, and
    /// codecs with a `DISABLED` priority are kept apart. With `multicast`
    /// only SBC is created.
    ///
    /// # Errors
    /// `NoCodecs` if no source or no sink codec could be created
    pub fn init(&mut self, multicast: bool) -> Result<(), A2dpError> {
        debug!("[A2DP] Initializing codecs, multicast: {}", multicast);
        self.indexed.clear();
        self.disabled.clear();
        let mut ordered_source = CodecIndexList::new();
        let mut ordered_sink = CodecIndexList::new();

        for index in CodecIndex::ALL {
            if multicast && !matches!(index, CodecIndex::SourceSbc | CodecIndex::SinkSbc) {
                info!("[A2DP] Skipping {} as multicast is enabled", index);
                continue;
            }
            if !self.offload.is_codec_enabled(index) {
                debug!("[A2DP] {} is not enabled", index);
                continue;
            }

            let priority = self
                .priorities
                .get(&index)
                .copied()
                .unwrap_or(CodecPriority::DEFAULT);
            let variant = CodecVariant::new(index, &self.offload, &self.options);
            let codec = A2dpCodec::new(variant, priority);
            if priority != CodecPriority::DEFAULT {
                info!("[A2DP] Updated {} codec priority to {}", index, priority.0);
            }

            if codec.priority() == CodecPriority::DISABLED {
                self.disabled.insert(index, codec).ok();
                continue;
            }
            self.indexed.insert(index, codec).ok();
            if index.is_source() {
                ordered_source.push(index).ok();
            } else {
                ordered_sink.push(index).ok();
            }
        }

        sort_by_priority(&self.indexed, &mut ordered_source);
        sort_by_priority(&self.indexed, &mut ordered_sink);

        for index in &ordered_source {
            info!("[A2DP] Initialized source codec {}", index);
        }
        for index in &ordered_sink {
            info!("[A2DP] Initialized sink codec {}", index);
        }
        let result = if ordered_source.is_empty() || ordered_sink.is_empty() {
            error!(
                "[A2DP] No codecs initialized: {} source, {} sink",
                ordered_source.len(),
                ordered_sink.len()
            );
            Err(A2dpError::NoCodecs)
        } else {
            Ok(())
        };

        self.state.lock(|s| {
            *s.borrow_mut() = RegistryState {
                ordered_source,
                ordered_sink,
                current: None,
            };
        });
        result
    }

    /// Enabled plugin for `index`
    #[must_use]
    pub fn codec(&self, index: CodecIndex) -> Option<&A2dpCodec> {
        self.indexed.get(&index)
    }

    /// Source plugin an element belongs to
    #[must_use]
    pub fn find_source_codec_config(&self, info: &[u8]) -> Option<&A2dpCodec> {
        self.codec(source_codec_index(info)?)
    }

    /// Sink plugin an element belongs to
    #[must_use]
    pub fn find_sink_codec_config(&self, info: &[u8]) -> Option<&A2dpCodec> {
        self.codec(sink_codec_index(info)?)
    }

    /// Current codec
    #[must_use]
    pub fn current_codec(&self) -> Option<&A2dpCodec> {
        self.state
            .lock(|s| s.borrow().current)
            .and_then(|index| self.codec(index))
    }

    /// Source codecs, highest priority first
    #[must_use]
    pub fn ordered_source_codecs(&self) -> CodecIndexList {
        self.state.lock(|s| s.borrow().ordered_source.clone())
    }

    /// Sink codecs, highest priority first
    #[must_use]
    pub fn ordered_sink_codecs(&self) -> CodecIndexList {
        self.state.lock(|s| s.borrow().ordered_sink.clone())
    }

    /// Codecs disabled by priority
    pub fn disabled_codecs(&self) -> impl Iterator<Item = &A2dpCodec> {
        self.disabled.values()
    }

    /// Negotiate the source codec `peer` belongs to with its stored
    /// preferences, and make it current if `select_current` is set
    ///
    /// # Errors
    /// `NsCodecType` if no enabled plugin handles `peer`, negotiation errors
    /// otherwise
    pub fn set_codec_config(
        &self,
        peer: &[u8],
        is_capability: bool,
        select_current: bool,
    ) -> Result<CodecInfo, A2dpError> {
        self.state.lock(|s| {
            let codec = self
                .find_source_codec_config(peer)
                .ok_or(A2dpError::NsCodecType)?;
            let result = codec.set_codec_config(peer, is_capability)?;
            if select_current {
                debug!("[A2DP] Selecting {} as current codec", codec.index());
                s.borrow_mut().current = Some(codec.index());
            }
            Ok(result)
        })
    }

    /// Apply a user preference.
    ///
    /// The preference targets its codec index, or the current codec when it
    /// has none. A target that gains a priority at least as high as the
    /// current codec's takes over and the previous codec falls back to its
    /// default priority.
    ///
    /// # Errors
    /// `InvalidParams` if the target codec is unknown, negotiation errors
    /// otherwise
    pub fn set_codec_user_config(
        &self,
        user: &CodecConfig,
        peer_params: &PeerParams,
        peer_capability: &[u8],
    ) -> Result<CodecUpdate, A2dpError> {
        debug!("[A2DP] User config for {}: {}", peer_params.addr, user);
        self.state.lock(|s| {
            let mut state = s.borrow_mut();
            let last = state.current;
            let codec = user
                .codec_index
                .or(last)
                .and_then(|index| self.codec(index))
                .ok_or(A2dpError::InvalidParams)?;
            let index = codec.index();

            let audio = codec.audio_config();
            let mut update = codec.set_codec_user_config(user, &audio, peer_capability, true)?;

            let old_priority = codec.priority();
            codec.set_codec_priority(user.priority);
            let new_priority = codec.priority();
            debug!(
                "[A2DP] {} priority {} -> {}",
                index, old_priority.0, new_priority.0
            );

            match last {
                None => {
                    state.current = Some(index);
                    update.restart_output = true;
                }
                Some(last) if last == index => {
                    if old_priority != new_priority {
                        update.config_updated = true;
                        // A lower priority may let another codec win
                        update.restart_output |= new_priority < old_priority;
                    }
                }
                Some(_) if new_priority <= old_priority => {
                    // Not the current codec and not promoted: nothing to restart
                    update.config_updated |= old_priority != new_priority;
                    update.restart_input = false;
                    update.restart_output = false;
                }
                Some(last) => {
                    update.config_updated = true;
                    if let Some(previous) = self.codec(last) {
                        if new_priority >= previous.priority() {
                            info!("[A2DP] {} takes over from {}", index, last);
                            state.current = Some(index);
                            previous.set_default_codec_priority();
                            update.restart_output = true;
                        }
                    }
                }
            }

            sort_by_priority(&self.indexed, &mut state.ordered_source);
            update.config_updated |= update.restart_input || update.restart_output;
            debug!(
                "[A2DP] restart input: {}, restart output: {}, config updated: {}",
                update.restart_input, update.restart_output, update.config_updated
            );
            Ok(update)
        })
    }

    /// Re-negotiate the current codec with a new audio-stream preference,
    /// keeping its user preference
    ///
    /// # Errors
    /// `InvalidParams` without a current codec, negotiation errors otherwise
    pub fn set_codec_audio_config(
        &self,
        audio: &CodecConfig,
        peer_params: &PeerParams,
        peer_capability: &[u8],
    ) -> Result<CodecUpdate, A2dpError> {
        debug!("[A2DP] Audio config for {}: {}", peer_params.addr, audio);
        self.state.lock(|s| {
            let codec = s
                .borrow()
                .current
                .and_then(|index| self.codec(index))
                .ok_or(A2dpError::InvalidParams)?;
            let user = codec.user_config();
            let update = codec.set_codec_user_config(&user, audio, peer_capability, true)?;
            // The input was just restarted by the audio path
            Ok(CodecUpdate {
                restart_input: false,
                ..update
            })
        })
    }

    /// Apply a configuration chosen by the peer.
    ///
    /// The targeted codec becomes current and is negotiated with its stored
    /// preferences. When the peer prefers the mandatory codec and picked SBC,
    /// SBC is promoted to the highest priority.
    ///
    /// # Errors
    /// `NsCodecType` if no enabled plugin handles `ota`, negotiation errors
    /// otherwise
    pub fn set_codec_ota_config(
        &self,
        ota: &[u8],
        peer_params: &PeerParams,
    ) -> Result<CodecUpdate, A2dpError> {
        self.state.lock(|s| {
            let codec = self.find_source_codec_config(ota).ok_or_else(|| {
                warn!("[A2DP] Ignoring peer OTA configuration: unknown codec");
                A2dpError::NsCodecType
            })?;
            let index = codec.index();

            let mut user = codec.user_config();
            let audio = codec.audio_config();
            let previous_priority = codec.priority();
            // TODO: move the mandatory codec preference into the caller's peer policy
            if peer_params.prefers_mandatory_codec && index == CodecIndex::SourceSbc {
                debug!("[A2DP] {} prefers SBC, raising its priority", peer_params.addr);
                user = CodecConfig::for_codec(index).with_priority(CodecPriority::HIGHEST);
                codec.set_codec_priority(CodecPriority::HIGHEST);
            }

            match codec.set_codec_user_config(&user, &audio, ota, false) {
                Ok(mut update) => {
                    let mut state = s.borrow_mut();
                    state.current = Some(index);
                    sort_by_priority(&self.indexed, &mut state.ordered_source);
                    update.config_updated |= update.restart_input || update.restart_output;
                    Ok(update)
                }
                Err(err) => {
                    warn!("[A2DP] Cannot apply peer OTA configuration for {}: {}", index, err);
                    codec.set_codec_priority(previous_priority);
                    Err(err)
                }
            }
        })
    }

    /// Current configuration and the capabilities of every source codec
    #[must_use]
    pub fn get_codec_config_and_capabilities(&self) -> CodecReport {
        self.state.lock(|s| {
            let state = s.borrow();
            let mut report = CodecReport {
                current: state
                    .current
                    .and_then(|index| self.codec(index))
                    .map(A2dpCodec::config),
                local_capabilities: CodecConfigList::new(),
                selectable_capabilities: CodecConfigList::new(),
            };

            for codec in state.ordered_source.iter().filter_map(|&i| self.codec(i)) {
                report.local_capabilities.push(codec.local_capability()).ok();
                let selectable = codec.selectable_capability();
                if selectable.sample_rate.is_none()
                    || selectable.bits_per_sample.is_none()
                    || selectable.channel_mode.is_none()
                {
                    continue;
                }
                report.selectable_capabilities.push(selectable).ok();
            }
            report
        })
    }
}

impl core::fmt::Display for A2dpCodecs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "A2DP Codecs State:")?;
        match self.current_codec() {
            Some(codec) => writeln!(f, "  Current Codec: {}", codec.name())?,
            None => writeln!(f, "  Current Codec: None")?,
        }
        for index in &self.ordered_source_codecs() {
            if let Some(codec) = self.codec(*index) {
                writeln!(f, "{codec}")?;
            }
        }
        Ok(())
    }
}

/// Sort descending by priority, the larger codec index winning ties
fn sort_by_priority(indexed: &FnvIndexMap<CodecIndex, A2dpCodec, MAX_CODECS>, list: &mut [CodecIndex]) {
    list.sort_unstable_by_key(|index| {
        let priority = indexed
            .get(index)
            .map_or(CodecPriority::DISABLED, A2dpCodec::priority);
        Reverse((priority, *index))
    });
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::a2dp::aac::AacCie;
    use crate::a2dp::codec::CodecInfoElement;
    use crate::a2dp::config::{ChannelMode, SampleRate};
    use crate::a2dp::offload::OffloadConfig;
    use crate::a2dp::sbc::SbcCie;
    use crate::a2dp::vendor::LdacCie;
    use std::string::ToString;

    fn registry(priorities: &[CodecConfig]) -> A2dpCodecs {
        let offload = OffloadCapabilities::new(&OffloadConfig::default());
        let mut codecs = A2dpCodecs::new(priorities, offload, A2dpCodecOptions::default());
        codecs.init(false).unwrap();
        codecs
    }

    fn priority(index: CodecIndex, priority: i32) -> CodecConfig {
        CodecConfig::for_codec(index).with_priority(CodecPriority(priority))
    }

    fn aac_caps() -> CodecInfo {
        AacCie {
            object_type: AacCie::OBJ_MPEG2_LC,
            sample_rate: AacCie::SAMPLING_FREQ_44100 | AacCie::SAMPLING_FREQ_48000,
            channel_mode: AacCie::CHANNEL_MONO | AacCie::CHANNEL_STEREO,
            variable_bit_rate: false,
            bit_rate: 320_000,
        }
        .build()
        .unwrap()
    }

    fn peer() -> PeerParams {
        PeerParams {
            addr: BluetoothAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]),
            prefers_mandatory_codec: false,
        }
    }

    #[test]
    fn test_init_orders_by_priority() {
        let codecs = registry(&[]);
        assert_eq!(
            codecs.ordered_source_codecs().as_slice(),
            &[
                CodecIndex::SourceLdac,
                CodecIndex::SourceAptxHd,
                CodecIndex::SourceAptx,
                CodecIndex::SourceAac,
                CodecIndex::SourceSbc,
            ]
        );
        assert_eq!(codecs.ordered_sink_codecs().as_slice(), &[CodecIndex::SinkSbc]);
        assert!(codecs.current_codec().is_none());
    }

    #[test]
    fn test_init_with_configured_priorities() {
        let codecs = registry(&[
            priority(CodecIndex::SourceSbc, 7000),
            priority(CodecIndex::SourceAac, 7000),
            priority(CodecIndex::SourceAptx, -1),
        ]);
        // Equal priorities: the larger index first
        assert_eq!(
            codecs.ordered_source_codecs().as_slice(),
            &[
                CodecIndex::SourceAac,
                CodecIndex::SourceSbc,
                CodecIndex::SourceLdac,
                CodecIndex::SourceAptxHd,
            ]
        );
        assert!(codecs.codec(CodecIndex::SourceAptx).is_none());
        let disabled: std::vec::Vec<CodecIndex> =
            codecs.disabled_codecs().map(A2dpCodec::index).collect();
        assert_eq!(disabled, [CodecIndex::SourceAptx]);
    }

    #[test]
    fn test_init_multicast_keeps_sbc() {
        let offload = OffloadCapabilities::new(&OffloadConfig::default());
        let mut codecs = A2dpCodecs::new(&[], offload, A2dpCodecOptions::default());
        assert_eq!(codecs.init(true), Ok(()));
        assert_eq!(codecs.ordered_source_codecs().as_slice(), &[CodecIndex::SourceSbc]);
        assert_eq!(codecs.ordered_sink_codecs().as_slice(), &[CodecIndex::SinkSbc]);
    }

    #[test]
    fn test_init_without_source_codecs() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            offload_enabled: true,
            ..OffloadConfig::default()
        });
        let mut codecs = A2dpCodecs::new(&[], offload, A2dpCodecOptions::default());
        assert_eq!(codecs.init(false), Err(A2dpError::NoCodecs));
        assert!(codecs.ordered_source_codecs().is_empty());
    }

    #[test]
    fn test_init_skips_codecs_not_enabled() {
        let offload = OffloadCapabilities::new(&OffloadConfig {
            offload_enabled: true,
            offload_caps: heapless::String::try_from("sbc-aac").unwrap(),
            ..OffloadConfig::default()
        });
        let mut codecs = A2dpCodecs::new(&[], offload, A2dpCodecOptions::default());
        codecs.init(false).unwrap();
        assert_eq!(
            codecs.ordered_source_codecs().as_slice(),
            &[CodecIndex::SourceAac, CodecIndex::SourceSbc]
        );
        // AAC picked the offload capability table
        let aac = codecs.codec(CodecIndex::SourceAac).unwrap();
        assert_eq!(aac.local_capability().sample_rate, SampleRate::HZ_48000);
    }

    #[test]
    fn test_dispatch() {
        let codecs = registry(&[]);
        let sbc = SbcCie::SINK_CAPS.build().unwrap();
        assert_eq!(
            codecs.find_source_codec_config(&sbc).map(A2dpCodec::index),
            Some(CodecIndex::SourceSbc)
        );
        assert_eq!(
            codecs.find_sink_codec_config(&sbc).map(A2dpCodec::index),
            Some(CodecIndex::SinkSbc)
        );
        assert_eq!(
            codecs.find_source_codec_config(&aac_caps()).map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
        assert_eq!(
            codecs
                .find_source_codec_config(&LdacCie::CAPS.build().unwrap())
                .map(A2dpCodec::index),
            Some(CodecIndex::SourceLdac)
        );
        assert!(codecs.find_sink_codec_config(&aac_caps()).is_none());

        let mut mp3 = aac_caps();
        mp3[2] = CodecType::Mpeg12Audio as u8;
        assert!(codecs.find_source_codec_config(&mp3).is_none());
        assert!(codecs.find_source_codec_config(&[]).is_none());
    }

    #[test]
    fn test_set_codec_config_selects_current() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&aac_caps(), true, false).unwrap();
        assert!(codecs.current_codec().is_none());

        let result = codecs.set_codec_config(&aac_caps(), true, true).unwrap();
        let current = codecs.current_codec().unwrap();
        assert_eq!(current.index(), CodecIndex::SourceAac);
        assert_eq!(current.copy_out_ota_codec_config(), result);

        let mut unknown = aac_caps();
        unknown[2] = CodecType::Atrac as u8;
        assert_eq!(
            codecs.set_codec_config(&unknown, true, true),
            Err(A2dpError::NsCodecType)
        );
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
    }

    #[test]
    fn test_user_config_without_current_codec() {
        let codecs = registry(&[]);
        assert_eq!(
            codecs.set_codec_user_config(&CodecConfig::default(), &peer(), &aac_caps()),
            Err(A2dpError::InvalidParams)
        );

        let user = CodecConfig::for_codec(CodecIndex::SourceAac);
        let update = codecs
            .set_codec_user_config(&user, &peer(), &aac_caps())
            .unwrap();
        assert!(update.restart_output);
        assert!(update.config_updated);
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
    }

    #[test]
    fn test_codec_switch_triggers_restart() {
        // With default priorities LDAC sits at 5001, so asking for 5000 would
        // lower it and never switch. Start LDAC below AAC (2001, not SBC's
        // 1001) so the user request is a promotion.
        let codecs = registry(&[priority(CodecIndex::SourceLdac, 500)]);
        codecs.set_codec_config(&aac_caps(), true, true).unwrap();
        let aac = codecs.codec(CodecIndex::SourceAac).unwrap();
        assert_eq!(aac.priority(), CodecPriority(2001));

        aac.set_codec_priority(CodecPriority(3500));
        let user = priority(CodecIndex::SourceLdac, 5000);
        let update = codecs
            .set_codec_user_config(&user, &peer(), &LdacCie::CAPS.build().unwrap())
            .unwrap();

        assert!(update.restart_output);
        assert!(update.config_updated);
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceLdac)
        );
        assert_eq!(aac.priority(), CodecPriority(2001));
        assert_eq!(codecs.ordered_source_codecs()[0], CodecIndex::SourceLdac);
    }

    #[test]
    fn test_lower_priority_on_other_codec_does_not_restart() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&aac_caps(), true, true).unwrap();

        let user = priority(CodecIndex::SourceLdac, 100);
        let update = codecs
            .set_codec_user_config(&user, &peer(), &LdacCie::CAPS.build().unwrap())
            .unwrap();
        assert!(!update.restart_input);
        assert!(!update.restart_output);
        assert!(update.config_updated);
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
        assert_eq!(
            codecs.ordered_source_codecs().last(),
            Some(&CodecIndex::SourceLdac)
        );
    }

    #[test]
    fn test_lowering_current_priority_restarts() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&aac_caps(), true, true).unwrap();

        let user = priority(CodecIndex::SourceAac, 10);
        let update = codecs
            .set_codec_user_config(&user, &peer(), &aac_caps())
            .unwrap();
        assert!(update.restart_output);
        assert!(update.config_updated);

        // Same priority again: nothing to do
        let update = codecs
            .set_codec_user_config(&user, &peer(), &aac_caps())
            .unwrap();
        assert!(!update.restart_output);
        assert!(!update.config_updated);
    }

    #[test]
    fn test_failed_user_config_keeps_current() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&aac_caps(), true, true).unwrap();
        let before = codecs.codec(CodecIndex::SourceAac).unwrap().state();

        let mono_only = AacCie {
            object_type: AacCie::OBJ_MPEG2_LC,
            sample_rate: AacCie::SAMPLING_FREQ_44100,
            channel_mode: AacCie::CHANNEL_MONO,
            variable_bit_rate: false,
            bit_rate: 320_000,
        }
        .build()
        .unwrap();
        let user = priority(CodecIndex::SourceAac, 9000);
        assert_eq!(
            codecs.set_codec_user_config(&user, &peer(), &mono_only),
            Err(A2dpError::BadChMode)
        );
        assert_eq!(codecs.codec(CodecIndex::SourceAac).unwrap().state(), before);
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
    }

    #[test]
    fn test_audio_config_keeps_user_config() {
        let codecs = registry(&[]);
        let ldac = LdacCie::CAPS.build().unwrap();
        assert_eq!(
            codecs.set_codec_audio_config(&CodecConfig::default(), &peer(), &ldac),
            Err(A2dpError::InvalidParams)
        );

        let user = CodecConfig::for_codec(CodecIndex::SourceLdac)
            .with_channel_mode(ChannelMode::MONO);
        codecs.set_codec_user_config(&user, &peer(), &ldac).unwrap();

        let audio = CodecConfig::for_codec(CodecIndex::SourceLdac)
            .with_sample_rate(SampleRate::HZ_48000);
        let update = codecs
            .set_codec_audio_config(&audio, &peer(), &ldac)
            .unwrap();
        assert!(!update.restart_input);
        assert!(update.restart_output);

        let current = codecs.current_codec().unwrap();
        assert_eq!(current.config().sample_rate, SampleRate::HZ_48000);
        assert_eq!(current.config().channel_mode, ChannelMode::MONO);
        assert_eq!(current.user_config(), user);
        assert_eq!(current.audio_config(), audio);
    }

    #[test]
    fn test_ota_config_selects_codec() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&LdacCie::CAPS.build().unwrap(), true, true).unwrap();

        let ota = AacCie {
            object_type: AacCie::OBJ_MPEG2_LC,
            sample_rate: AacCie::SAMPLING_FREQ_44100,
            channel_mode: AacCie::CHANNEL_STEREO,
            variable_bit_rate: false,
            bit_rate: 256_000,
        }
        .build()
        .unwrap();
        let update = codecs.set_codec_ota_config(&ota, &peer()).unwrap();
        assert_eq!(update.result_codec_info, ota);
        assert!(update.config_updated);
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
        assert_eq!(codecs.codec(CodecIndex::SourceAac).unwrap().state().ota_peer_config, ota);
    }

    #[test]
    fn test_ota_config_mandatory_codec_override() {
        let codecs = registry(&[]);
        let ota = SbcCie::DEFAULT_CONFIG.build().unwrap();
        let params = PeerParams {
            prefers_mandatory_codec: true,
            ..peer()
        };

        codecs.set_codec_ota_config(&ota, &params).unwrap();
        let sbc = codecs.codec(CodecIndex::SourceSbc).unwrap();
        assert_eq!(sbc.priority(), CodecPriority::HIGHEST);
        assert_eq!(sbc.user_config().priority, CodecPriority::HIGHEST);
        assert_eq!(codecs.ordered_source_codecs()[0], CodecIndex::SourceSbc);
    }

    #[test]
    fn test_ota_config_failure_restores_state() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&aac_caps(), true, true).unwrap();

        // Bitpool range outside the local one
        let mut cie = SbcCie::DEFAULT_CONFIG;
        cie.min_bitpool = 60;
        cie.max_bitpool = 80;
        let params = PeerParams {
            prefers_mandatory_codec: true,
            ..peer()
        };
        assert_eq!(
            codecs.set_codec_ota_config(&cie.build().unwrap(), &params),
            Err(A2dpError::BadMaxBitpool)
        );
        assert_eq!(
            codecs.current_codec().map(A2dpCodec::index),
            Some(CodecIndex::SourceAac)
        );
        assert_eq!(
            codecs.codec(CodecIndex::SourceSbc).unwrap().priority(),
            CodecPriority(1001)
        );

        let mut unknown = aac_caps();
        unknown[2] = CodecType::Atrac as u8;
        assert_eq!(
            codecs.set_codec_ota_config(&unknown, &peer()),
            Err(A2dpError::NsCodecType)
        );
    }

    #[test]
    fn test_codec_report() {
        let codecs = registry(&[]);
        let report = codecs.get_codec_config_and_capabilities();
        assert!(report.current.is_none());
        assert_eq!(report.local_capabilities.len(), 5);
        assert_eq!(
            report.local_capabilities[0].codec_index,
            Some(CodecIndex::SourceLdac)
        );
        assert!(report.selectable_capabilities.is_empty());

        codecs.set_codec_config(&aac_caps(), true, true).unwrap();
        let report = codecs.get_codec_config_and_capabilities();
        let current = report.current.unwrap();
        assert_eq!(current.codec_index, Some(CodecIndex::SourceAac));
        assert_eq!(current.sample_rate, SampleRate::HZ_44100);
        assert_eq!(report.selectable_capabilities.len(), 1);
        assert_eq!(
            report.selectable_capabilities[0].codec_index,
            Some(CodecIndex::SourceAac)
        );
    }

    #[test]
    fn test_dump() {
        let codecs = registry(&[]);
        codecs.set_codec_config(&aac_caps(), true, true).unwrap();
        let dump = codecs.to_string();
        assert!(dump.starts_with("A2DP Codecs State:\n  Current Codec: AAC\n"));
        assert!(dump.contains("A2DP Codec: LDAC (priority 5001)"));
    }

    #[test]
    fn test_concurrent_callers() {
        let codecs = registry(&[]);
        let ldac = LdacCie::CAPS.build().unwrap();
        let aac = aac_caps();

        std::thread::scope(|scope| {
            for i in 0..4 {
                let codecs = &codecs;
                let (ldac, aac) = (&ldac, &aac);
                scope.spawn(move || {
                    for _ in 0..50 {
                        let peer = if i % 2 == 0 { ldac } else { aac };
                        codecs.set_codec_config(peer, true, true).unwrap();
                        let report = codecs.get_codec_config_and_capabilities();
                        assert!(report.current.is_some());
                    }
                });
            }
        });

        let current = codecs.current_codec().unwrap();
        assert!(matches!(
            current.index(),
            CodecIndex::SourceLdac | CodecIndex::SourceAac
        ));
        assert!(!current.config().has_none_field());
    }
}
