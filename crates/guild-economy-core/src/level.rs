//! Level thresholds and the progression calculator.
//!
//! The table is read-only at grant time; operators reshape it out of band.
//! `locate` is the single source of truth for `(level, level_exp)` — both
//! the experience write path and read-only previews go through it, so no
//! account can commit an inconsistent pair.

use serde::{Deserialize, Serialize};

/// Number of tiers in the standard table (levels 0 through 10).
pub const STANDARD_TIER_COUNT: u32 = 11;

/// Base experience for the standard curve: `100 * (level + 1)^2` per tier.
const STANDARD_BASE_EXP: i64 = 100;

/// One row of the threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTier {
    /// The level this row configures.
    pub level: u32,

    /// Experience needed to advance to the next level; 0 at the top tier.
    pub exp_required: i64,

    /// Cumulative experience needed to hold this level.
    pub exp_cumulative: i64,
}

/// A user's position on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStanding {
    /// Current level.
    pub level: u32,

    /// Experience accumulated past this level's cumulative threshold.
    pub level_exp: i64,
}

/// Ordered level threshold table.
///
/// Tiers are kept sorted ascending by level; construction enforces that
/// cumulative thresholds are non-decreasing so `locate` stays monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelTable {
    tiers: Vec<LevelTier>,
}

impl LevelTable {
    /// Build a table from explicit tiers.
    ///
    /// Tiers are sorted by level; a tier whose cumulative threshold is below
    /// its predecessor's is discarded as misconfigured.
    #[must_use]
    pub fn new(mut tiers: Vec<LevelTier>) -> Self {
        tiers.sort_by_key(|t| t.level);
        let mut floor = i64::MIN;
        tiers.retain(|t| {
            let keep = t.exp_cumulative >= floor;
            if keep {
                floor = t.exp_cumulative;
            }
            keep
        });
        Self { tiers }
    }

    /// The default 11-tier ladder on the quadratic curve
    /// `exp_required(level) = 100 * (level + 1)^2`.
    #[must_use]
    pub fn standard() -> Self {
        let mut tiers = Vec::with_capacity(STANDARD_TIER_COUNT as usize);
        let mut cumulative = 0_i64;
        for level in 0..STANDARD_TIER_COUNT {
            let at_top = level + 1 == STANDARD_TIER_COUNT;
            let step = i64::from(level + 1);
            let exp_required = if at_top { 0 } else { STANDARD_BASE_EXP * step * step };
            tiers.push(LevelTier {
                level,
                exp_required,
                exp_cumulative: cumulative,
            });
            cumulative += exp_required;
        }
        Self { tiers }
    }

    /// All tiers, ascending by level.
    #[must_use]
    pub fn tiers(&self) -> &[LevelTier] {
        &self.tiers
    }

    /// The tier configuring `level`, if present.
    #[must_use]
    pub fn tier(&self, level: u32) -> Option<&LevelTier> {
        self.tiers.iter().find(|t| t.level == level)
    }

    /// The highest configured level.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.tiers.last().map_or(0, |t| t.level)
    }

    /// Map cumulative experience to a level standing.
    ///
    /// Scans from the highest tier downward and returns the first whose
    /// cumulative threshold is satisfied; below the lowest threshold the
    /// standing is level 0 with all experience in-level. Pure and
    /// deterministic; monotonic in `total_exp`.
    #[must_use]
    pub fn locate(&self, total_exp: i64) -> LevelStanding {
        for tier in self.tiers.iter().rev() {
            if total_exp >= tier.exp_cumulative {
                return LevelStanding {
                    level: tier.level,
                    level_exp: total_exp - tier.exp_cumulative,
                };
            }
        }
        LevelStanding {
            level: 0,
            level_exp: total_exp,
        }
    }

    /// Experience remaining to the next tier and the fraction of the current
    /// tier completed. At the top tier both are `(0, 1.0)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self, total_exp: i64) -> (i64, f64) {
        let standing = self.locate(total_exp);
        let Some(next) = self.tier(standing.level + 1) else {
            return (0, 1.0);
        };
        let current_base = self
            .tier(standing.level)
            .map_or(0, |t| t.exp_cumulative);
        let span = next.exp_cumulative - current_base;
        if span <= 0 {
            return (0, 1.0);
        }
        let remaining = (next.exp_cumulative - total_exp).max(0);
        let ratio = (total_exp - current_base) as f64 / span as f64;
        (remaining, ratio.clamp(0.0, 1.0))
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::standard()
    }
}
