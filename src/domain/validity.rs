use chrono::{Datelike, Months, NaiveDate};

use super::credential::{CredentialFields, CredentialType};

/// CRED documents are valid for two years after concession.
const CRED_VALIDITY_MONTHS: u32 = 24;

/// Validity for a document granted on `concession`.
///
/// CRED: concession + 2 years (29 Feb clamps to 28 Feb).
/// TCMS: 31 Dec of the concession year.
pub fn compute_validity(kind: CredentialType, concession: NaiveDate) -> Option<NaiveDate> {
    match kind {
        CredentialType::Cred => concession.checked_add_months(Months::new(CRED_VALIDITY_MONTHS)),
        CredentialType::Tcms => NaiveDate::from_ymd_opt(concession.year(), 12, 31),
    }
}

/// Pre-write hook: refresh `next.validity` when the fields it depends on changed.
///
/// `previous` is the stored row for updates and `None` for inserts. Returns
/// whether validity was recomputed.
pub fn apply_validity(next: &mut CredentialFields, previous: Option<&CredentialFields>) -> bool {
    let recompute = match previous {
        None => true,
        Some(prev) => {
            prev.concession != next.concession
                || (prev.kind != next.kind && next.concession.is_some())
        }
    };

    if !recompute {
        if let Some(prev) = previous {
            next.validity = prev.validity;
        }
        return false;
    }

    next.validity = next
        .concession
        .and_then(|concession| compute_validity(next.kind, concession));
    true
}
