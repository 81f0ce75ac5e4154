pub mod config;
pub mod ledger;
pub mod lnurl;
pub mod solve;
pub mod status;
pub mod tiers;
