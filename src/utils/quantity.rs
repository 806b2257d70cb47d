// Copyright 2026 The OpenEBS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Conversions between Kubernetes quantities and byte counts.
//!
//! Volume capacities are always stored as a whole number of gibibytes
//! (`"<n>Gi"`), so every request is rounded up before it reaches the
//! cluster store.

use crate::types::error::{Error, InvalidQuantitySnafu};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

pub const GIB: u64 = 1024 * 1024 * 1024;

const SUFFIXES: &[(&str, u128)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parses a quantity such as `5Gi`, `1500M` or `1073741824` into bytes.
///
/// Fractional values are rounded up to the next whole byte.
pub fn to_bytes(quantity: &Quantity) -> Result<u64, Error> {
    parse_bytes(&quantity.0)
}

pub fn parse_bytes(value: &str) -> Result<u64, Error> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    if number.is_empty() {
        return InvalidQuantitySnafu { value }.fail();
    }

    let multiplier = if suffix.is_empty() {
        1
    } else {
        SUFFIXES
            .iter()
            .find(|(s, _)| *s == suffix)
            .map(|(_, m)| *m)
            .ok_or_else(|| Error::InvalidQuantity {
                value: value.to_owned(),
            })?
    };

    let bytes = match number.split_once('.') {
        None => number
            .parse::<u128>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier)),
        Some((whole, frac)) => {
            let whole = if whole.is_empty() { "0" } else { whole };
            let scale = 10u128.checked_pow(frac.len() as u32);
            let digits = format!("{whole}{frac}").parse::<u128>().ok();
            match (digits, scale) {
                (Some(digits), Some(scale)) => digits
                    .checked_mul(multiplier)
                    .map(|n| n.div_ceil(scale)),
                _ => None,
            }
        }
    };

    bytes
        .and_then(|b| u64::try_from(b).ok())
        .ok_or_else(|| Error::InvalidQuantity {
            value: value.to_owned(),
        })
}

/// Number of whole gibibytes needed to hold `bytes`.
pub fn round_up_gib(bytes: u64) -> u64 {
    bytes.div_ceil(GIB)
}

/// A `<n>Gi` quantity.
pub fn gib_quantity(gib: u64) -> Quantity {
    Quantity(format!("{gib}Gi"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_and_decimal_suffixes() {
        assert_eq!(parse_bytes("1Gi").unwrap(), GIB);
        assert_eq!(parse_bytes("512Mi").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_bytes("2G").unwrap(), 2_000_000_000);
        assert_eq!(parse_bytes("4096").unwrap(), 4096);
        assert_eq!(parse_bytes("1.5Gi").unwrap(), GIB + GIB / 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("Gi").is_err());
        assert!(parse_bytes("12Xi").is_err());
    }

    #[test]
    fn test_round_up_gib() {
        assert_eq!(round_up_gib(1), 1);
        assert_eq!(round_up_gib(GIB), 1);
        assert_eq!(round_up_gib(GIB + 1), 2);
        assert_eq!(round_up_gib(0), 0);
        assert_eq!(gib_quantity(3).0, "3Gi");
    }
}
