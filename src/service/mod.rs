pub mod backup;
pub mod credentials;
pub mod directory;
pub mod job_lock;
pub mod metrics;
pub mod notify;
pub mod rotation;
pub mod tokens;
pub mod users;

use chrono::{Local, NaiveDate};

pub use credentials::CredentialService;
pub use directory::DirectoryService;
pub use users::UserService;

/// Calendar date used for status and expiry decisions.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
