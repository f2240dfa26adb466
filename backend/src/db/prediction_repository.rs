use chrono::{SubsecRound, Utc};
use rusqlite::{params, Row};
use shared::{CropHealth, PredictionStats};
use uuid::Uuid;

use super::models::{NewPrediction, PredictionRecord};
use super::{Database, RepositoryError, format_timestamp, parse_timestamp};

const SELECT_COLUMNS: &str =
    "id, username, image_ref, prediction, confidence, is_healthy, crop_type, created_at";

/// Append-only store of prediction records; rows are never updated or
/// deleted.
#[derive(Clone)]
pub struct PredictionRepository {
    db: Database,
}

impl PredictionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, new: NewPrediction) -> Result<PredictionRecord, RepositoryError> {
        let record = PredictionRecord::from_new(new, Utc::now().trunc_subsecs(6));
        let row = record.clone();
        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO user_predictions \
                     (id, username, image_ref, prediction, confidence, is_healthy, crop_type, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.id.to_string(),
                        row.owner,
                        row.image_ref,
                        row.label,
                        row.confidence as f64,
                        row.is_healthy,
                        row.crop_type,
                        format_timestamp(&row.created_at),
                    ],
                )?;
                Ok(())
            })
            .await?;
        log::info!(
            "Saved prediction {} for {}: {} ({:.2})",
            record.id,
            record.owner,
            record.label,
            record.confidence
        );
        Ok(record)
    }

    /// All records of `owner`, newest first.
    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<PredictionRecord>, RepositoryError> {
        self.query_by_owner(owner, None).await
    }

    /// The `limit` most recent records of `owner`.
    pub async fn recent_by_owner(
        &self,
        owner: &str,
        limit: u32,
    ) -> Result<Vec<PredictionRecord>, RepositoryError> {
        self.query_by_owner(owner, Some(limit)).await
    }

    async fn query_by_owner(
        &self,
        owner: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PredictionRecord>, RepositoryError> {
        let owner = owner.to_string();
        self.db
            .run(move |conn| {
                // -1 means no limit in SQLite.
                let limit = limit.map(i64::from).unwrap_or(-1);
                let sql = format!(
                    "SELECT {} FROM user_predictions WHERE username = ?1 \
                     ORDER BY created_at DESC, seq DESC LIMIT ?2",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![owner, limit], read_row)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(into_record(row?)?);
                }
                Ok(records)
            })
            .await
    }

    pub async fn owner_stats(&self, owner: &str) -> Result<PredictionStats, RepositoryError> {
        let owner = owner.to_string();
        self.db
            .run(move |conn| {
                let (total, healthy, diseased): (i64, i64, i64) = conn.query_row(
                    "SELECT COUNT(*), \
                            COALESCE(SUM(CASE WHEN is_healthy = 1 THEN 1 ELSE 0 END), 0), \
                            COALESCE(SUM(CASE WHEN is_healthy = 0 THEN 1 ELSE 0 END), 0) \
                     FROM user_predictions WHERE username = ?1",
                    params![owner],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                Ok(PredictionStats {
                    total: total as u64,
                    healthy: healthy as u64,
                    diseased: diseased as u64,
                })
            })
            .await
    }

    /// Per-crop counts for `owner`, ordered by crop type.
    pub async fn crop_health(&self, owner: &str) -> Result<Vec<CropHealth>, RepositoryError> {
        let owner = owner.to_string();
        self.db
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT crop_type, \
                            COUNT(*), \
                            COALESCE(SUM(CASE WHEN is_healthy = 1 THEN 1 ELSE 0 END), 0), \
                            COALESCE(SUM(CASE WHEN is_healthy = 0 THEN 1 ELSE 0 END), 0) \
                     FROM user_predictions WHERE username = ?1 \
                     GROUP BY crop_type ORDER BY crop_type",
                )?;
                let rows = stmt.query_map(params![owner], |row| {
                    let crop_type: Option<String> = row.get(0)?;
                    let total: i64 = row.get(1)?;
                    let healthy: i64 = row.get(2)?;
                    let diseased: i64 = row.get(3)?;
                    Ok(crop_health_entry(
                        crop_type.unwrap_or_default(),
                        total.max(0) as u64,
                        healthy.max(0) as u64,
                        diseased.max(0) as u64,
                    ))
                })?;
                let mut groups = Vec::new();
                for row in rows {
                    groups.push(row?);
                }
                Ok(groups)
            })
            .await
    }
}

pub fn health_percentage(healthy: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = healthy as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

fn crop_health_entry(crop_type: String, total: u64, healthy: u64, diseased: u64) -> CropHealth {
    let crop_type = if crop_type.trim().is_empty() {
        "Unknown".to_string()
    } else {
        crop_type
    };
    CropHealth {
        crop_type,
        total,
        healthy,
        diseased,
        health_percentage: health_percentage(healthy, total),
    }
}

struct StoredRow {
    id: String,
    owner: String,
    image_ref: String,
    label: String,
    confidence: f64,
    is_healthy: bool,
    crop_type: String,
    created_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        owner: row.get(1)?,
        image_ref: row.get(2)?,
        label: row.get(3)?,
        confidence: row.get(4)?,
        is_healthy: row.get(5)?,
        crop_type: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn into_record(row: StoredRow) -> Result<PredictionRecord, RepositoryError> {
    let id = Uuid::parse_str(&row.id)
        .map_err(|e| RepositoryError::InvalidData(format!("bad id '{}': {}", row.id, e)))?;
    Ok(PredictionRecord {
        id,
        owner: row.owner,
        image_ref: row.image_ref,
        label: row.label,
        confidence: row.confidence as f32,
        is_healthy: row.is_healthy,
        crop_type: row.crop_type,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_database;

    fn new_prediction(owner: &str, crop: &str, healthy: bool) -> NewPrediction {
        NewPrediction {
            owner: owner.to_string(),
            image_ref: format!("uploads/{}.jpg", crop),
            label: if healthy {
                format!("{}___healthy", crop)
            } else {
                format!("{}___Bacterial_blight", crop)
            },
            confidence: 0.9,
            is_healthy: healthy,
            crop_type: crop.to_string(),
        }
    }

    #[actix_web::test]
    async fn aggregates_by_crop_type() {
        let (_dir, db) = temp_database();
        let repo = PredictionRepository::new(db);
        for i in 0..10 {
            repo.save(new_prediction("farmer", "Rice", i < 7)).await.unwrap();
        }
        repo.save(new_prediction("farmer", "Corn", false)).await.unwrap();
        repo.save(new_prediction("someone_else", "Rice", false)).await.unwrap();

        let groups = repo.crop_health("farmer").await.unwrap();
        assert_eq!(groups.len(), 2);
        let rice = groups.iter().find(|g| g.crop_type == "Rice").unwrap();
        assert_eq!(rice.total, 10);
        assert_eq!(rice.healthy, 7);
        assert_eq!(rice.diseased, 3);
        assert_eq!(rice.health_percentage, 70.0);
        let corn = groups.iter().find(|g| g.crop_type == "Corn").unwrap();
        assert_eq!(corn.health_percentage, 0.0);

        let stats = repo.owner_stats("farmer").await.unwrap();
        assert_eq!(stats, PredictionStats { total: 11, healthy: 7, diseased: 4 });
    }

    #[actix_web::test]
    async fn empty_owner_has_zero_stats() {
        let (_dir, db) = temp_database();
        let repo = PredictionRepository::new(db);
        assert_eq!(repo.owner_stats("nobody").await.unwrap(), PredictionStats::default());
        assert!(repo.crop_health("nobody").await.unwrap().is_empty());
        assert!(repo.list_by_owner("nobody").await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn listing_is_newest_first_and_scoped_to_owner() {
        let (_dir, db) = temp_database();
        let repo = PredictionRepository::new(db);
        let mut saved = Vec::new();
        for crop in ["Rice", "Wheat", "Corn", "Cotton"] {
            saved.push(repo.save(new_prediction("farmer", crop, true)).await.unwrap());
        }
        repo.save(new_prediction("other", "Rice", true)).await.unwrap();

        let listed = repo.list_by_owner("farmer").await.unwrap();
        assert_eq!(listed.len(), 4);
        let expected: Vec<_> = saved.iter().rev().map(|r| r.id).collect();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), expected);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(listed.iter().all(|r| r.owner == "farmer"));

        let recent = repo.recent_by_owner("farmer", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].crop_type, "Cotton");
    }

    #[actix_web::test]
    async fn saved_records_read_back_unchanged() {
        let (_dir, db) = temp_database();
        let repo = PredictionRepository::new(db);
        let saved = repo
            .save(new_prediction("farmer", "Tomato", false))
            .await
            .unwrap();
        saved_records_match(&repo, &saved).await;
        // Appending more rows leaves earlier ones untouched.
        repo.save(new_prediction("farmer", "Tomato", true)).await.unwrap();
        saved_records_match(&repo, &saved).await;
    }

    async fn saved_records_match(repo: &PredictionRepository, saved: &PredictionRecord) {
        let listed = repo.list_by_owner("farmer").await.unwrap();
        let found = listed.iter().find(|r| r.id == saved.id).unwrap();
        assert_eq!(found, saved);
    }

    #[test]
    fn percentage_rounding_and_zero_total() {
        assert_eq!(health_percentage(0, 0), 0.0);
        assert_eq!(health_percentage(1, 3), 33.33);
        assert_eq!(health_percentage(2, 3), 66.67);
        assert_eq!(health_percentage(7, 10), 70.0);
    }

    #[test]
    fn blank_crop_type_is_reported_as_unknown() {
        assert_eq!(crop_health_entry(String::new(), 1, 1, 0).crop_type, "Unknown");
    }
}
