use crate::db::{DbOffice, DbRank, Storage};
use crate::domain::ValidationErrors;
use crate::domain::validation::LookupInput;
use crate::error::CredtrackError;

/// Rank and office reference tables.
#[derive(Clone)]
pub struct DirectoryService {
    storage: Storage,
}

impl DirectoryService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn ranks(&self) -> Result<Vec<DbRank>, CredtrackError> {
        self.storage.list_ranks().await
    }

    pub async fn create_rank(&self, input: LookupInput) -> Result<DbRank, CredtrackError> {
        let rank = input.validate()?;
        if self.storage.rank_name_taken(&rank.name).await? {
            return Err(ValidationErrors::single("name", "The name has already been taken.").into());
        }
        self.storage.insert_rank(&rank).await
    }

    pub async fn offices(&self) -> Result<Vec<DbOffice>, CredtrackError> {
        self.storage.list_offices().await
    }

    pub async fn create_office(&self, input: LookupInput) -> Result<DbOffice, CredtrackError> {
        let office = input.validate()?;
        if self.storage.office_name_taken(&office.name).await? {
            return Err(ValidationErrors::single("name", "The name has already been taken.").into());
        }
        self.storage.insert_office(&office).await
    }
}
