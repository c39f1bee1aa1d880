//! Credential lifecycle status, derived on read from the stored fields.
//!
//! Decision order:
//!   fscs == "00000"                        -> Negada
//!   validity < today                       -> Vencida
//!   TCMS, no fscs, number contains "TCMS"  -> Válida
//!   TCMS, no fscs                          -> Pane - Verificar
//!   TCMS, fscs, concession                 -> Em Processamento
//!   TCMS, fscs, no concession              -> Pane - Verificar
//!   CRED, no concession                    -> Pendente
//!   CRED, concession                       -> Válida

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::credential::{CredentialFields, CredentialType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialStatus {
    #[serde(rename = "Negada")]
    Denied,
    #[serde(rename = "Vencida")]
    Expired,
    #[serde(rename = "Em Processamento")]
    Processing,
    #[serde(rename = "Pendente")]
    Pending,
    #[serde(rename = "Válida")]
    Valid,
    #[serde(rename = "Pane - Verificar")]
    NeedsReview,
}

/// Display palette shared with the admin front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Danger,
    Warning,
    Success,
    Info,
    Primary,
    Gray,
}

impl CredentialStatus {
    pub const ALL: [CredentialStatus; 6] = [
        CredentialStatus::Denied,
        CredentialStatus::Expired,
        CredentialStatus::Processing,
        CredentialStatus::Pending,
        CredentialStatus::Valid,
        CredentialStatus::NeedsReview,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CredentialStatus::Denied => "Negada",
            CredentialStatus::Expired => "Vencida",
            CredentialStatus::Processing => "Em Processamento",
            CredentialStatus::Pending => "Pendente",
            CredentialStatus::Valid => "Válida",
            CredentialStatus::NeedsReview => "Pane - Verificar",
        }
    }

    pub fn color(self) -> StatusColor {
        match self {
            CredentialStatus::Denied | CredentialStatus::Expired => StatusColor::Danger,
            CredentialStatus::Processing => StatusColor::Info,
            CredentialStatus::Pending => StatusColor::Warning,
            CredentialStatus::Valid => StatusColor::Success,
            CredentialStatus::NeedsReview => StatusColor::Gray,
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CredentialStatus::ALL
            .into_iter()
            .find(|status| status.label().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown status `{s}`"))
    }
}

/// Derive the status of a credential as of `today`.
pub fn derive_status(fields: &CredentialFields, today: NaiveDate) -> CredentialStatus {
    if fields.is_denied() {
        return CredentialStatus::Denied;
    }
    if fields.validity.is_some_and(|validity| validity < today) {
        return CredentialStatus::Expired;
    }

    match (fields.kind, fields.fscs.is_some(), fields.concession.is_some()) {
        (CredentialType::Tcms, false, _) => {
            let is_term = fields
                .credential
                .as_deref()
                .is_some_and(|number| number.to_uppercase().contains("TCMS"));
            if is_term {
                CredentialStatus::Valid
            } else {
                CredentialStatus::NeedsReview
            }
        }
        (CredentialType::Tcms, true, true) => CredentialStatus::Processing,
        (CredentialType::Tcms, true, false) => CredentialStatus::NeedsReview,
        (CredentialType::Cred, _, false) => CredentialStatus::Pending,
        (CredentialType::Cred, _, true) => CredentialStatus::Valid,
    }
}
