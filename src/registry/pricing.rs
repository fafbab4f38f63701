//! Registration price schedule
//!
//! Short names cost more. The price is a USD amount in `unit`s, tiered by the
//! name's length in grapheme clusters.

use serde::{Deserialize, Serialize};

use super::record::grapheme_len;

/// Micro-USD, the mainnet unit
pub const MAINNET_PRICE_UNIT: u64 = 1_000_000;

/// Devnet charges a thousandth of mainnet
pub const DEVNET_PRICE_UNIT: u64 = 1_000;

/// Length-tiered registration price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSchedule {
    /// Value of one whole USD
    pub unit: u64,
}

impl Default for PriceSchedule {
    fn default() -> Self {
        Self {
            unit: MAINNET_PRICE_UNIT,
        }
    }
}

impl PriceSchedule {
    pub fn new(unit: u64) -> Self {
        Self { unit }
    }

    /// Whole USD for a name of `len` graphemes
    pub fn usd_for_len(len: usize) -> u64 {
        match len {
            0 => 0,
            1 => 750,
            2 => 700,
            3 => 640,
            4 => 160,
            5..=9 => 20,
            _ => 1,
        }
    }

    /// Price of `label` in `unit`s
    pub fn price(&self, label: &str) -> u64 {
        Self::usd_for_len(grapheme_len(label)).saturating_mul(self.unit)
    }
}
