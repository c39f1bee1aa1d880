pub mod credentials;
pub mod directory;
pub mod health;
pub mod users;
