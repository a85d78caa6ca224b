//! Domain counters. Exported through the Prometheus recorder installed at start-up.

use crate::models::InvitationRole;

pub fn invitation_issued(role: InvitationRole, dispatched: bool) {
    metrics::counter!(
        "invitations_issued_total",
        "role" => role.as_str(),
        "dispatch" => if dispatched { "sent" } else { "failed" }
    )
    .increment(1);
}

pub fn invitation_accepted(role: InvitationRole, cabinet_created: bool) {
    metrics::counter!(
        "invitations_accepted_total",
        "role" => role.as_str(),
        "cabinet_created" => if cabinet_created { "true" } else { "false" }
    )
    .increment(1);
}

/// `outcome` is one of `verified`, `already_used`, `expired`, `not_found`, `locked`.
pub fn two_factor_verification(outcome: &'static str) {
    metrics::counter!("two_factor_verifications_total", "outcome" => outcome).increment(1);
}

pub fn two_factor_issued() {
    metrics::counter!("two_factor_codes_issued_total").increment(1);
}
