use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};

use super::Database;
use crate::models::{Band, FaceRow, Idol, ImageInfo, Profiles, Rect};

/// All bands, ordered by id.
pub async fn get_bands(conn: &mut SqliteConnection) -> Result<Vec<Band>> {
    let rows = sqlx::query("SELECT id, data FROM bands ORDER BY id")
        .fetch_all(conn)
        .await?;
    rows.iter()
        .map(|row| Band::from_parts(row.get("id"), row.get("data")))
        .collect()
}

/// All idols, ordered by id.
pub async fn get_idols(conn: &mut SqliteConnection) -> Result<Vec<Idol>> {
    let rows = sqlx::query("SELECT id, band_id, data FROM idols ORDER BY id")
        .fetch_all(conn)
        .await?;
    rows.iter()
        .map(|row| Idol::from_parts(row.get("id"), row.get("band_id"), row.get("data")))
        .collect()
}

/// `idol id -> preview image id` from the confirmed faces.
pub async fn get_idol_previews(conn: &mut SqliteConnection) -> Result<HashMap<String, String>> {
    let rows = sqlx::query(
        "SELECT idol_id, MIN(image_id) AS image_id \
         FROM faces WHERE confirmed = 1 GROUP BY idol_id",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows.iter().map(|row| (row.get("idol_id"), row.get("image_id"))).collect())
}

/// Read the full profiles snapshot under one transaction, attaching the
/// derived preview image ids to the idols.
pub async fn get_profiles(pool: &Database) -> Result<Profiles> {
    let mut tx = pool.begin().await?;
    let bands = get_bands(&mut *tx).await?;
    let mut idols = get_idols(&mut *tx).await?;
    let previews = get_idol_previews(&mut *tx).await?;
    tx.commit().await?;

    for idol in &mut idols {
        idol.image_id = previews.get(&idol.id).cloned();
    }
    Ok(Profiles { bands, idols })
}

pub async fn upsert_band(conn: &mut SqliteConnection, id: &str, data: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO bands (id, data) VALUES (?, ?) \
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
    )
    .bind(id)
    .bind(data)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn upsert_idol(
    conn: &mut SqliteConnection,
    id: &str,
    band_id: &str,
    data: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO idols (id, band_id, data) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET band_id = excluded.band_id, data = excluded.data",
    )
    .bind(id)
    .bind(band_id)
    .bind(data)
    .execute(conn)
    .await?;
    Ok(())
}

/// Upsert one recognized face keyed by image content hash. Re-importing
/// the same bytes lands on the same row.
pub async fn upsert_face(conn: &mut SqliteConnection, face: &FaceRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO faces (image_id, idol_id, rect, descriptor, confirmed, source) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(image_id) DO UPDATE SET \
             idol_id = excluded.idol_id, \
             rect = excluded.rect, \
             descriptor = excluded.descriptor, \
             confirmed = excluded.confirmed, \
             source = excluded.source",
    )
    .bind(&face.image_id)
    .bind(&face.idol_id)
    .bind(face.rect.to_string())
    .bind(&face.descriptor)
    .bind(face.confirmed)
    .bind(&face.source)
    .execute(conn)
    .await?;
    Ok(())
}

/// Confirmed `(idol id, descriptor blob)` rows, grouped by idol id.
/// The training-set category assignment depends on this ordering.
pub async fn get_train_rows(pool: &Database) -> Result<Vec<(String, Vec<u8>)>> {
    let rows = sqlx::query(
        "SELECT idol_id, descriptor FROM faces \
         WHERE confirmed = 1 ORDER BY idol_id, image_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| (row.get("idol_id"), row.get("descriptor"))).collect())
}

/// Look up recognition info for an image by content hash.
pub async fn get_image_info(pool: &Database, image_id: &str) -> Result<Option<ImageInfo>> {
    let row = sqlx::query("SELECT rect, idol_id, confirmed FROM faces WHERE image_id = ?")
        .bind(image_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else { return Ok(None) };
    let rect: Rect = row
        .get::<String, _>("rect")
        .parse()
        .with_context(|| format!("corrupt rect for image {image_id}"))?;
    Ok(Some(ImageInfo { rect, idol_id: row.get("idol_id"), confirmed: row.get("confirmed") }))
}

/// Number of faces rows, test and logging helper.
pub async fn count_faces(pool: &Database) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM faces").fetch_one(pool).await?;
    Ok(row.get("count"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_db;
    use crate::engine::{DESCRIPTOR_LEN, Descriptor};

    pub(crate) async fn seed_idol(pool: &Database, band_id: &str, band: &str, idol_id: &str, idol: &str) {
        let mut tx = pool.begin().await.unwrap();
        upsert_band(&mut *tx, band_id, &format!(r#"{{"name":"{band}"}}"#)).await.unwrap();
        upsert_idol(&mut *tx, idol_id, band_id, &format!(r#"{{"name":"{idol}"}}"#))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    fn face_row(image_id: &str, idol_id: &str, fill: f32) -> FaceRow {
        FaceRow {
            image_id: image_id.to_owned(),
            idol_id: idol_id.to_owned(),
            rect: Rect { left: 0, top: 0, right: 10, bottom: 10 },
            descriptor: Descriptor([fill; DESCRIPTOR_LEN]).to_bytes(),
            confirmed: true,
            source: "test".to_owned(),
        }
    }

    #[tokio::test]
    async fn profiles_snapshot_attaches_previews() {
        let pool = memory_db().await;
        seed_idol(&pool, "b1", "fromis_9", "i1", "Nagyung").await;
        seed_idol(&pool, "b2", "LOONA", "i2", "Chuu").await;

        let mut conn = pool.acquire().await.unwrap();
        upsert_face(&mut *conn, &face_row("hash-b", "i1", 0.0)).await.unwrap();
        upsert_face(&mut *conn, &face_row("hash-a", "i1", 0.5)).await.unwrap();
        drop(conn);

        let profiles = get_profiles(&pool).await.unwrap();
        assert_eq!(profiles.bands.len(), 2);
        assert_eq!(profiles.idols.len(), 2);

        let nagyung = profiles.idols.iter().find(|i| i.id == "i1").unwrap();
        assert_eq!(nagyung.image_id.as_deref(), Some("hash-a"));
        let chuu = profiles.idols.iter().find(|i| i.id == "i2").unwrap();
        assert_eq!(chuu.image_id, None);
    }

    #[tokio::test]
    async fn face_upsert_is_idempotent_per_hash() {
        let pool = memory_db().await;
        seed_idol(&pool, "b1", "Band", "i1", "Idol").await;

        let mut conn = pool.acquire().await.unwrap();
        upsert_face(&mut *conn, &face_row("same-hash", "i1", 0.0)).await.unwrap();
        upsert_face(&mut *conn, &face_row("same-hash", "i1", 1.0)).await.unwrap();
        drop(conn);

        assert_eq!(count_faces(&pool).await.unwrap(), 1);
        let info = get_image_info(&pool, "same-hash").await.unwrap().unwrap();
        assert_eq!(info.idol_id, "i1");
        assert!(info.confirmed);
        assert_eq!(get_image_info(&pool, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn train_rows_come_back_grouped_by_idol() {
        let pool = memory_db().await;
        seed_idol(&pool, "b1", "Band", "a", "A").await;
        seed_idol(&pool, "b1", "Band", "b", "B").await;

        let mut conn = pool.acquire().await.unwrap();
        upsert_face(&mut *conn, &face_row("h3", "b", 0.3)).await.unwrap();
        upsert_face(&mut *conn, &face_row("h1", "a", 0.1)).await.unwrap();
        upsert_face(&mut *conn, &face_row("h2", "a", 0.2)).await.unwrap();
        drop(conn);

        let rows = get_train_rows(&pool).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["a", "a", "b"]);
    }
}
