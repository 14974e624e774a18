//! Series detectors
//!
//! # Components
//!
//! - **Wick profile**: single-bar candle anatomy classifier
//! - **Volatility**: true range and rolling ATR
//! - **Zones**: supply/demand zone detection and point-in-time zone matching
//! - **Inside bar**: the three-candle breakout setup with outcome simulation

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod inside_bar;
pub mod volatility;
pub mod wick;
pub mod zones;

impl_with_defaults!(InsideBarDetector, ZoneDetector, ZoneMatcher);

pub use inside_bar::*;
pub use wick::*;
pub use zones::*;
