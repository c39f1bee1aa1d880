//! Business rules for personnel credentials, independent of storage and transport.
//!
//! - `credential.rs`: document type, secrecy level and the rule-bearing fields
//! - `status.rs`: status derivation and display colors
//! - `validity.rs`: validity calculation and the pre-write hook
//! - `validation.rs`: payload validation with field-keyed messages

pub mod credential;
pub mod status;
pub mod validation;
pub mod validity;

pub use credential::{CredentialFields, CredentialType, DENIED_FSCS, Secrecy};
pub use status::{CredentialStatus, StatusColor, derive_status};
pub use validation::ValidationErrors;
pub use validity::{apply_validity, compute_validity};
