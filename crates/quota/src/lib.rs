//! Rolling-window quota accounting.
//!
//! Pure arithmetic only: the policy (tier limits and window length), the
//! per-(organizer, channel) reservation ledger and the all-or-nothing
//! reservation decision. Making check-and-reserve atomic across concurrent
//! callers is the job of the trackers in `eventcrm-infra`.

pub mod ledger;
pub mod policy;

pub use ledger::{QuotaExceeded, QuotaGrant, QuotaLedger, QuotaStatus};
pub use policy::QuotaPolicy;
