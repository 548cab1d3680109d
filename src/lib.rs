#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

#[macro_use]
mod fmt;

pub mod a2dp;
mod address;
pub mod constants;

pub use address::BluetoothAddress;

/// Options for configuring the codec plugins
///
/// # Examples
///
/// ```rust
/// use codecbird::A2dpCodecOptions;
///
/// // Use default options
/// let default_options = A2dpCodecOptions::default();
///
/// // Qualification testing: report AAC channel errors the way the test
/// // suite expects
/// let pts = A2dpCodecOptions { pts_mode: true };
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct A2dpCodecOptions {
    /// Profile Tuning Suite mode
    ///
    /// An AAC configuration with more than one channel mode bit set is
    /// rejected with `BadChannel` instead of `BadChMode`.
    pub pts_mode: bool,
}
