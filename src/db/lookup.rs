use crate::db::models::{DbOffice, DbRank};
use crate::db::sqlite::Storage;
use crate::domain::validation::ValidatedLookup;
use crate::error::CredtrackError;

impl Storage {
    pub async fn list_ranks(&self) -> Result<Vec<DbRank>, CredtrackError> {
        let ranks = sqlx::query_as::<_, DbRank>(
            "SELECT id, name, abbreviation, sort_order FROM ranks ORDER BY sort_order, name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ranks)
    }

    pub async fn insert_rank(&self, rank: &ValidatedLookup) -> Result<DbRank, CredtrackError> {
        let result =
            sqlx::query("INSERT INTO ranks (name, abbreviation, sort_order) VALUES (?, ?, ?)")
                .bind(&rank.name)
                .bind(&rank.short_name)
                .bind(rank.sort_order)
                .execute(self.pool())
                .await?;
        Ok(DbRank {
            id: result.last_insert_rowid(),
            name: rank.name.clone(),
            abbreviation: rank.short_name.clone(),
            sort_order: rank.sort_order,
        })
    }

    pub async fn rank_exists(&self, id: i64) -> Result<bool, CredtrackError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ranks WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }

    pub async fn rank_name_taken(&self, name: &str) -> Result<bool, CredtrackError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ranks WHERE lower(name) = lower(?)")
                .bind(name)
                .fetch_one(self.pool())
                .await?;
        Ok(count > 0)
    }

    pub async fn list_offices(&self) -> Result<Vec<DbOffice>, CredtrackError> {
        let offices =
            sqlx::query_as::<_, DbOffice>("SELECT id, name, acronym FROM offices ORDER BY name")
                .fetch_all(self.pool())
                .await?;
        Ok(offices)
    }

    pub async fn insert_office(&self, office: &ValidatedLookup) -> Result<DbOffice, CredtrackError> {
        let result = sqlx::query("INSERT INTO offices (name, acronym) VALUES (?, ?)")
            .bind(&office.name)
            .bind(&office.short_name)
            .execute(self.pool())
            .await?;
        Ok(DbOffice {
            id: result.last_insert_rowid(),
            name: office.name.clone(),
            acronym: office.short_name.clone(),
        })
    }

    pub async fn office_exists(&self, id: i64) -> Result<bool, CredtrackError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offices WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }

    pub async fn office_name_taken(&self, name: &str) -> Result<bool, CredtrackError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM offices WHERE lower(name) = lower(?)")
                .bind(name)
                .fetch_one(self.pool())
                .await?;
        Ok(count > 0)
    }
}
