use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FSCS code reserved for denied applications.
pub const DENIED_FSCS: &str = "00000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "CRED")]
    Cred,
    #[serde(rename = "TCMS")]
    Tcms,
}

impl CredentialType {
    pub const ALL: [CredentialType; 2] = [CredentialType::Cred, CredentialType::Tcms];

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::Cred => "CRED",
            CredentialType::Tcms => "TCMS",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRED" => Ok(CredentialType::Cred),
            "TCMS" => Ok(CredentialType::Tcms),
            other => Err(format!("unknown credential type `{other}`")),
        }
    }
}

/// Classification level: Reservado, Secreto, Acesso Restrito.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Secrecy {
    #[serde(rename = "R")]
    Reservado,
    #[serde(rename = "S")]
    Secreto,
    #[serde(rename = "AR")]
    AcessoRestrito,
}

impl Secrecy {
    pub const ALL: [Secrecy; 3] = [Secrecy::Reservado, Secrecy::Secreto, Secrecy::AcessoRestrito];

    pub fn as_str(self) -> &'static str {
        match self {
            Secrecy::Reservado => "R",
            Secrecy::Secreto => "S",
            Secrecy::AcessoRestrito => "AR",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Secrecy::Reservado => "Reservado",
            Secrecy::Secreto => "Secreto",
            Secrecy::AcessoRestrito => "Acesso Restrito",
        }
    }
}

impl fmt::Display for Secrecy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Secrecy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R" => Ok(Secrecy::Reservado),
            "S" => Ok(Secrecy::Secreto),
            "AR" => Ok(Secrecy::AcessoRestrito),
            other => Err(format!("unknown secrecy level `{other}`")),
        }
    }
}

/// The fields that drive status derivation and validity calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialFields {
    pub fscs: Option<String>,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub secrecy: Secrecy,
    pub credential: Option<String>,
    pub concession: Option<NaiveDate>,
    pub validity: Option<NaiveDate>,
    pub observation: Option<String>,
}

impl CredentialFields {
    pub fn is_denied(&self) -> bool {
        self.fscs.as_deref() == Some(DENIED_FSCS)
    }
}
