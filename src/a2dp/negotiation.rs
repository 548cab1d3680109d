//! Field selection shared by every codec plugin
//!
//! Negotiation is a pure function of the plugin's current state and the
//! inputs; it returns a [`Negotiated`] value that the caller commits only
//! on success.

use core::ops::{BitAnd, BitOr};

use super::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use super::ota::CodecInfo;
use super::CodecIndex;

/// Inputs of one negotiation
#[derive(Debug, Clone, Copy)]
pub struct NegotiationRequest<'a> {
    /// Peer codec info: capability or configuration
    pub peer: &'a [u8],
    /// Whether `peer` is a capability (multiple bits allowed)
    pub is_capability: bool,
    /// User preference
    pub user: &'a CodecConfig,
    /// Audio-stream preference
    pub audio: &'a CodecConfig,
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Concrete configuration
    pub config: CodecConfig,
    /// Capability shared with the peer
    pub capability: CodecConfig,
    /// Values the user could select with this peer
    pub selectable: CodecConfig,
    /// Encoded configuration, sent to the peer and kept as the local copy
    pub ota_config: CodecInfo,
    /// Re-encoded peer element
    pub ota_peer: CodecInfo,
}

/// Wire bitmask type of a codec field (`u8`, `u16`, ...)
pub(crate) trait WireMask: Copy + PartialEq + Default + BitAnd<Output = Self> {
    fn is_set(self) -> bool {
        self != Self::default()
    }
}

impl WireMask for u8 {}
impl WireMask for u16 {}
impl WireMask for BitsPerSample {}

/// Codec-independent value set (`SampleRate`, `ChannelMode`, ...)
pub(crate) trait ValueSet: Copy + PartialEq + Default + BitOr<Output = Self> {}

impl<A: Copy + PartialEq + Default + BitOr<Output = A>> ValueSet for A {}

/// Value chosen for one field together with the capability and
/// selectable sets reported for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Choice<A> {
    pub value: A,
    pub capability: A,
    pub selectable: A,
}

/// A resolved field: the wire bit and the chosen value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolved<N, A> {
    pub native: N,
    pub choice: Choice<A>,
}

/// Pick one value for a field.
///
/// `table` lists `(wire bit, value)` pairs best first. `common` is the
/// intersection of peer and local wire masks. Precedence is user, audio,
/// default (`default_native`), then the best entry in `common`.
pub(crate) fn select_field<N: WireMask, A: ValueSet>(
    table: &[(N, A)],
    common: N,
    user: A,
    audio: A,
    default_native: N,
) -> Option<Resolved<N, A>> {
    let candidates = || available(table, common);
    let selectable = candidates().fold(A::default(), |acc, (_, value)| acc | value);

    if let Some((native, value)) = candidates().find(|&(_, value)| value == user) {
        return Some(Resolved {
            native,
            choice: Choice {
                value,
                capability: user,
                selectable,
            },
        });
    }

    let (native, value) = candidates()
        .find(|&(_, value)| value == audio)
        .or_else(|| candidates().find(|&(native, _)| (native & default_native).is_set()))
        .or_else(|| candidates().next())?;

    Some(Resolved {
        native,
        choice: Choice {
            value,
            capability: selectable,
            selectable,
        },
    })
}

fn available<N: WireMask, A: Copy>(
    table: &[(N, A)],
    common: N,
) -> impl Iterator<Item = (N, A)> + '_ {
    table
        .iter()
        .copied()
        .filter(move |&(native, _)| (native & common).is_set())
}

/// Pick a wire-only field (no codec-independent counterpart): the default
/// if it is available, else the best entry of `order` in `common`
pub(crate) fn select_native<N: WireMask>(order: &[N], common: N, default_native: N) -> Option<N> {
    order
        .iter()
        .copied()
        .find(|&bit| (bit & common & default_native).is_set())
        .or_else(|| order.iter().copied().find(|&bit| (bit & common).is_set()))
}

/// Fold every wire bit of `mask` found in `table` into its value set
pub(crate) fn mask_to_values<N: WireMask, A: ValueSet>(table: &[(N, A)], mask: N) -> A {
    available(table, mask).fold(A::default(), |acc, (_, value)| acc | value)
}

/// The three PCM fields of one negotiation
#[derive(Debug, Clone, Copy)]
pub(crate) struct PcmFields {
    pub sample_rate: Choice<SampleRate>,
    pub bits_per_sample: Choice<BitsPerSample>,
    pub channel_mode: Choice<ChannelMode>,
}

impl PcmFields {
    /// Build the result, capability and selectable records
    pub fn into_records(
        self,
        index: CodecIndex,
        user: &CodecConfig,
    ) -> (CodecConfig, CodecConfig, CodecConfig) {
        let mut config = CodecConfig::for_codec(index)
            .with_sample_rate(self.sample_rate.value)
            .with_bits_per_sample(self.bits_per_sample.value)
            .with_channel_mode(self.channel_mode.value);
        copy_codec_specific(user, &mut config);

        let capability = CodecConfig::for_codec(index)
            .with_sample_rate(self.sample_rate.capability)
            .with_bits_per_sample(self.bits_per_sample.capability)
            .with_channel_mode(self.channel_mode.capability);

        let selectable = CodecConfig::for_codec(index)
            .with_sample_rate(self.sample_rate.selectable)
            .with_bits_per_sample(self.bits_per_sample.selectable)
            .with_channel_mode(self.channel_mode.selectable);

        (config, capability, selectable)
    }
}

/// Copy non-zero user codec-specific slots, unvalidated
pub(crate) fn copy_codec_specific(user: &CodecConfig, config: &mut CodecConfig) {
    for (dst, &src) in config.codec_specific.iter_mut().zip(user.codec_specific.iter()) {
        if src != 0 {
            *dst = src;
        }
    }
}

/// Bits-per-sample preference, best first
const BITS_PER_SAMPLE_TABLE: [(BitsPerSample, BitsPerSample); 3] = [
    (BitsPerSample::BITS_32, BitsPerSample::BITS_32),
    (BitsPerSample::BITS_24, BitsPerSample::BITS_24),
    (BitsPerSample::BITS_16, BitsPerSample::BITS_16),
];

/// Resolve bits per sample against the local capability only; the sample
/// width is not carried on the wire
pub(crate) fn select_bits_per_sample(
    local: BitsPerSample,
    user: &CodecConfig,
    audio: &CodecConfig,
    default: BitsPerSample,
) -> Option<Choice<BitsPerSample>> {
    select_field(
        &BITS_PER_SAMPLE_TABLE,
        local,
        user.bits_per_sample,
        audio.bits_per_sample,
        default,
    )
    .map(|resolved| resolved.choice)
}
