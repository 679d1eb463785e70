//! Pure economic admission control for has-sector discovery queries.

use crate::Error;

/// A price, expressed in the smallest accounted unit. Kept as a newtype
/// over `u128` so a raw count can never silently stand in for a cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Currency(pub u128);

impl Currency {
    pub fn checked_mul(self, rhs: u64) -> Option<Currency> {
        self.0.checked_mul(rhs as u128).map(Currency)
    }

    pub fn checked_div(self, rhs: u64) -> Option<Currency> {
        if rhs == 0 {
            return None;
        }
        Some(Currency(self.0 / rhs as u128))
    }
}

/// The subset of a host's price table relevant to gouging checks.
#[derive(Debug, Clone, Copy)]
pub struct HostPriceTable {
    /// Price per byte of download bandwidth the host charges.
    pub download_bandwidth_price: Currency,
    /// Fixed cost of a has-sector RPC, independent of root count.
    pub has_sector_base_cost: Currency,
    /// Marginal cost per piece root queried in one has-sector RPC.
    pub has_sector_per_root_cost: Currency,
}

impl HostPriceTable {
    /// Cost of a single has-sector job covering `num_roots` piece roots.
    pub fn has_sector_job_cost(&self, num_roots: u64) -> Currency {
        let per_root = self.has_sector_per_root_cost.checked_mul(num_roots).unwrap_or(Currency(u128::MAX));
        Currency(self.has_sector_base_cost.0.saturating_add(per_root.0))
    }
}

/// Per-user budget parameters used for gouging decisions.
#[derive(Debug, Clone, Copy)]
pub struct AllowanceConfig {
    /// Hard cap on a host's download bandwidth price. `None` means
    /// bandwidth-price gouging is not checked.
    pub max_download_bandwidth_price: Option<Currency>,
    /// Total funds available. Zero disables every cost-based check.
    pub funds: Currency,
    /// Total bytes the caller expects to download over the life of this
    /// allowance.
    pub expected_download: u64,
}

/// Bytes in one stream-download unit, matching the renter's download
/// scheduler chunking (out of scope here, but its constant still anchors
/// this cost model).
pub const STREAM_DOWNLOAD_SIZE: u64 = 1 << 20;

/// Denominator of the fraction of total funds a has-sector sweep may cost.
pub const GOUGING_FRACTION_DENOM: u64 = 25;

/// Decides whether querying a worker charging `price_table` for piece
/// availability is economically acceptable, given `num_workers` candidates
/// and `num_roots` piece roots in the chunk.
pub fn check_gouging(
    price_table: &HostPriceTable,
    allowance: &AllowanceConfig,
    num_workers: u64,
    num_roots: u64,
) -> Result<(), Error> {
    if let Some(cap) = allowance.max_download_bandwidth_price {
        if price_table.download_bandwidth_price > cap {
            return Err(Error::GougingDetected(format!(
                "download bandwidth price {} exceeds allowance cap {}",
                price_table.download_bandwidth_price.0, cap.0
            )));
        }
    }

    if allowance.funds.0 == 0 {
        return Ok(());
    }

    let downloads = allowance.expected_download / STREAM_DOWNLOAD_SIZE;
    let job_cost = price_table.has_sector_job_cost(num_roots);
    let total_cost = job_cost
        .checked_mul(downloads)
        .and_then(|c| c.checked_mul(num_workers))
        .unwrap_or(Currency(u128::MAX));

    let budget = allowance
        .funds
        .checked_div(GOUGING_FRACTION_DENOM)
        .unwrap_or(Currency(0));

    if total_cost > budget {
        return Err(Error::GougingDetected(format!(
            "has-sector sweep cost {} exceeds allowance budget {}",
            total_cost.0, budget.0
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_table(download_price: u128, base_cost: u128, per_root: u128) -> HostPriceTable {
        HostPriceTable {
            download_bandwidth_price: Currency(download_price),
            has_sector_base_cost: Currency(base_cost),
            has_sector_per_root_cost: Currency(per_root),
        }
    }

    #[test]
    fn zero_funds_skips_cost_checks() {
        let pt = price_table(1, u128::MAX, u128::MAX);
        let allowance = AllowanceConfig {
            max_download_bandwidth_price: None,
            funds: Currency(0),
            expected_download: STREAM_DOWNLOAD_SIZE * 100,
        };
        check_gouging(&pt, &allowance, 30, 10).unwrap();
    }

    #[test]
    fn bandwidth_cap_rejects_expensive_host() {
        let pt = price_table(100, 1, 1);
        let allowance = AllowanceConfig {
            max_download_bandwidth_price: Some(Currency(50)),
            funds: Currency(0),
            expected_download: 0,
        };
        let err = check_gouging(&pt, &allowance, 1, 1).unwrap_err();
        assert!(matches!(err, Error::GougingDetected(_)));
    }

    #[test]
    fn affordable_sweep_passes() {
        let pt = price_table(1, 10, 1);
        let allowance = AllowanceConfig {
            max_download_bandwidth_price: None,
            funds: Currency(1_000_000),
            expected_download: STREAM_DOWNLOAD_SIZE,
        };
        check_gouging(&pt, &allowance, 5, 10).unwrap();
    }

    #[test]
    fn expensive_sweep_is_gouging() {
        let pt = price_table(1, 10_000, 1_000);
        let allowance = AllowanceConfig {
            max_download_bandwidth_price: None,
            funds: Currency(1_000),
            expected_download: STREAM_DOWNLOAD_SIZE * 10,
        };
        let err = check_gouging(&pt, &allowance, 100, 30).unwrap_err();
        assert!(matches!(err, Error::GougingDetected(_)));
    }
}
