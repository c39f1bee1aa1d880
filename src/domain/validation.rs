use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::credential::{CredentialFields, CredentialType, Secrecy};

const MAX_SHORT_TEXT: usize = 255;
const MAX_FSCS_LEN: usize = 32;
const MAX_OBSERVATION_LEN: usize = 4000;

/// Field-keyed validation messages, serialized as `{ field: [messages] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn into_fields(self) -> BTreeMap<String, Vec<String>> {
        self.fields
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Trim and turn blank strings into `None`.
pub fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn check_len(errors: &mut ValidationErrors, field: &str, value: Option<&str>, max: usize) {
    if value.is_some_and(|v| v.chars().count() > max) {
        errors.add(field, format!("The {field} may not be greater than {max} characters."));
    }
}

/// Credential payload as submitted; `validity` is never accepted from clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialInput {
    pub user_id: Option<i64>,
    pub fscs: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub secrecy: Option<String>,
    pub credential: Option<String>,
    pub concession: Option<NaiveDate>,
    pub observation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCredential {
    pub user_id: i64,
    pub fields: CredentialFields,
}

impl CredentialInput {
    /// Shape checks that need no database access.
    pub fn validate(self, today: NaiveDate) -> Result<ValidatedCredential, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.user_id.is_none() {
            errors.add("user_id", "The user field is required.");
        }

        let kind = match normalize(self.kind).as_deref().map(str::parse::<CredentialType>) {
            None => {
                errors.add("type", "The type field is required.");
                None
            }
            Some(Err(_)) => {
                errors.add("type", "The selected type is invalid.");
                None
            }
            Some(Ok(kind)) => Some(kind),
        };

        let secrecy = match normalize(self.secrecy).as_deref().map(str::parse::<Secrecy>) {
            None => {
                errors.add("secrecy", "The secrecy field is required.");
                None
            }
            Some(Err(_)) => {
                errors.add("secrecy", "The selected secrecy is invalid.");
                None
            }
            Some(Ok(secrecy)) => Some(secrecy),
        };

        if self.concession.is_some_and(|concession| concession > today) {
            errors.add("concession", "The concession date cannot be in the future.");
        }

        let fscs = normalize(self.fscs);
        let credential = normalize(self.credential);
        let observation = normalize(self.observation);
        check_len(&mut errors, "fscs", fscs.as_deref(), MAX_FSCS_LEN);
        check_len(&mut errors, "credential", credential.as_deref(), MAX_SHORT_TEXT);
        check_len(&mut errors, "observation", observation.as_deref(), MAX_OBSERVATION_LEN);

        match (self.user_id, kind, secrecy) {
            (Some(user_id), Some(kind), Some(secrecy)) if errors.is_empty() => {
                Ok(ValidatedCredential {
                    user_id,
                    fields: CredentialFields {
                        fscs,
                        kind,
                        secrecy,
                        credential,
                        concession: self.concession,
                        validity: None,
                        observation,
                    },
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub rank_id: Option<i64>,
    pub office_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUser {
    pub name: String,
    pub full_name: String,
    pub email: String,
    pub rank_id: Option<i64>,
    pub office_id: Option<i64>,
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && domain.contains('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

impl UserInput {
    pub fn validate(self) -> Result<ValidatedUser, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = normalize(self.name);
        let full_name = normalize(self.full_name);
        let email = normalize(self.email).map(|e| e.to_lowercase());

        if name.is_none() {
            errors.add("name", "The name field is required.");
        }
        if full_name.is_none() {
            errors.add("full_name", "The full name field is required.");
        }
        match email.as_deref() {
            None => errors.add("email", "The email field is required."),
            Some(e) if !looks_like_email(e) => {
                errors.add("email", "The email must be a valid email address.")
            }
            Some(_) => {}
        }
        check_len(&mut errors, "name", name.as_deref(), MAX_SHORT_TEXT);
        check_len(&mut errors, "full_name", full_name.as_deref(), MAX_SHORT_TEXT);
        check_len(&mut errors, "email", email.as_deref(), MAX_SHORT_TEXT);

        match (name, full_name, email) {
            (Some(name), Some(full_name), Some(email)) if errors.is_empty() => Ok(ValidatedUser {
                name,
                full_name,
                email,
                rank_id: self.rank_id,
                office_id: self.office_id,
            }),
            _ => Err(errors),
        }
    }
}

/// Payload for the rank and office lookup tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupInput {
    pub name: Option<String>,
    /// Rank abbreviation or office acronym.
    pub short_name: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLookup {
    pub name: String,
    pub short_name: Option<String>,
    pub sort_order: i64,
}

impl LookupInput {
    pub fn validate(self) -> Result<ValidatedLookup, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = normalize(self.name);
        let short_name = normalize(self.short_name);
        if name.is_none() {
            errors.add("name", "The name field is required.");
        }
        check_len(&mut errors, "name", name.as_deref(), MAX_SHORT_TEXT);
        check_len(&mut errors, "short_name", short_name.as_deref(), MAX_FSCS_LEN);

        match name {
            Some(name) if errors.is_empty() => Ok(ValidatedLookup {
                name,
                short_name,
                sort_order: self.sort_order.unwrap_or(0),
            }),
            _ => Err(errors),
        }
    }
}
