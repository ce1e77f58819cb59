//! Pension distribution calculation for one beneficiary group

mod calculator;
mod result;

pub use calculator::{
    DistributionCalculator, ASCENDANT_CAP, CHILD_CAP, NO_SPOUSE_POOL, OTHERS_WITH_SPOUSE_POOL,
    SINGLE_OTHER_WITH_SPOUSE_SHARE, SOLE_BENEFICIARY_SHARE, SPOUSE_ALONE_SHARE,
    SPOUSE_SHARED_SHARE,
};
pub use result::{DistributionResult, DistributionSummary};
