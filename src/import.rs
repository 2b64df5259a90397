use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use sqlx::{Sqlite, Transaction};
use tokio::task::block_in_place;

use crate::db::{self, Database};
use crate::engine::FaceEngine;
use crate::models::FaceRow;

/// Provenance tag written on every imported face row.
pub const IMPORT_SOURCE: &str = "googleimages";

type NamesKey = (String, String);

/// Populate confirmed training rows from a directory tree laid out as
/// `band/idol/image`. Band and idol directory names are matched against
/// the catalog by exact display name.
///
/// One transaction per band: a failure rolls back only that band's rows
/// and previously committed bands stay imported. Unmatched idol
/// directories and images without exactly one face are warned about and
/// skipped, not fatal.
pub async fn import_images(
    pool: &Database,
    engine: &dyn FaceEngine,
    image_dir: &Path,
    only_bands: &[String],
) -> Result<()> {
    let idol_by_names = idol_name_index(pool).await.context("error querying idols")?;

    for (band_name, band_dir) in
        sorted_dirs(image_dir).context("error reading band directories")?
    {
        if !only_bands.is_empty() && !only_bands.contains(&band_name) {
            continue;
        }
        import_band(pool, engine, &band_dir, &band_name, &idol_by_names)
            .await
            .with_context(|| format!("error importing {band_name} images"))?;
    }
    Ok(())
}

/// `(band name, idol name) -> idol id`, from one snapshot read.
async fn idol_name_index(pool: &Database) -> Result<HashMap<NamesKey, String>> {
    let mut tx = pool.begin().await?;
    let bands = db::get_bands(&mut *tx).await?;
    let idols = db::get_idols(&mut *tx).await?;
    tx.commit().await?;

    let band_names: HashMap<&str, &str> =
        bands.iter().map(|b| (b.id.as_str(), b.name.as_str())).collect();

    let mut index = HashMap::new();
    for idol in &idols {
        if let Some(&band_name) = band_names.get(idol.band_id.as_str()) {
            index.insert((band_name.to_owned(), idol.name.clone()), idol.id.clone());
        }
    }
    Ok(index)
}

async fn import_band(
    pool: &Database,
    engine: &dyn FaceEngine,
    band_dir: &Path,
    band_name: &str,
    idol_by_names: &HashMap<NamesKey, String>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (idol_name, idol_dir) in sorted_dirs(band_dir)? {
        let key = (band_name.to_owned(), idol_name.clone());
        let Some(idol_id) = idol_by_names.get(&key) else {
            warn!("can't find {idol_name} ({band_name})");
            continue;
        };
        info!("importing {}", idol_dir.display());
        import_idol_images(&mut tx, engine, &idol_dir, idol_id).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn import_idol_images(
    tx: &mut Transaction<'_, Sqlite>,
    engine: &dyn FaceEngine,
    idol_dir: &Path,
    idol_id: &str,
) -> Result<()> {
    for path in sorted_files(idol_dir)? {
        let data =
            fs::read(&path).with_context(|| format!("error reading {}", path.display()))?;

        let face = block_in_place(|| engine.extract_single_face(&data))
            .with_context(|| format!("error extracting face from {}", path.display()))?;
        let Some(face) = face else {
            warn!("not a single face on {}", path.display());
            continue;
        };

        // The content hash is the image's stable identity: importing the
        // same bytes twice updates the same row.
        let image_id = blake3::hash(&data).to_hex().to_string();
        db::upsert_face(
            &mut **tx,
            &FaceRow {
                image_id,
                idol_id: idol_id.to_owned(),
                rect: face.rect,
                descriptor: face.descriptor.to_bytes(),
                confirmed: true,
                source: IMPORT_SOURCE.to_owned(),
            },
        )
        .await?;
    }
    Ok(())
}

/// Sub-directories of `path` as `(name, path)`, sorted by name.
fn sorted_dirs(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("error reading {}", path.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn sorted_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("error reading {}", path.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
