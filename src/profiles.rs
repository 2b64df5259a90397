use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use uuid::Uuid;

use crate::cache::{Cache, CacheKey};
use crate::db::{self, Database};
use crate::models::{Band, Idol, Profiles};

/// Per-band index file name; idol files use the idol name.
const INDEX_NAME: &str = "index";

/// Read all profiles from a directory of JSON files laid out as
/// `<band>/index.json` plus one `<idol>.json` per member.
pub fn read_profiles(dir: &Path) -> Result<Profiles> {
    let mut profiles = Profiles::default();

    let mut band_dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("error reading {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            band_dirs.push(entry.path());
        }
    }
    band_dirs.sort();

    for band_dir in band_dirs {
        let index_path = band_dir.join(format!("{INDEX_NAME}.json"));
        let band: Band = serde_json::from_slice(
            &fs::read(&index_path)
                .with_context(|| format!("error reading {}", index_path.display()))?,
        )
        .with_context(|| format!("error parsing {}", index_path.display()))?;

        for idol_file in idol_files(&band_dir)? {
            let idol: Idol = serde_json::from_slice(
                &fs::read(&idol_file)
                    .with_context(|| format!("error reading {}", idol_file.display()))?,
            )
            .with_context(|| format!("error parsing {}", idol_file.display()))?;
            profiles.idols.push(idol);
        }
        profiles.bands.push(band);
    }

    Ok(profiles)
}

fn idol_files(band_dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(band_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json")
            && path.file_stem().is_some_and(|s| s != INDEX_NAME)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Insert or update catalog profiles in one transaction, then clear the
/// cached profiles snapshot. Records arriving without an id get one
/// assigned here and keep it forever after.
pub async fn update_profiles(
    pool: &Database,
    cache: &Cache,
    profiles: &Profiles,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for band in &profiles.bands {
        let id = assigned_id(&band.id);
        db::upsert_band(&mut *tx, &id, &band.storage_data()?).await?;
    }
    for idol in &profiles.idols {
        let id = assigned_id(&idol.id);
        db::upsert_idol(&mut *tx, &id, &idol.band_id, &idol.storage_data()?).await?;
    }

    tx.commit().await?;
    info!("updated {} bands and {} idols", profiles.bands.len(), profiles.idols.len());

    cache.invalidate(CacheKey::Profiles).await;
    Ok(())
}

fn assigned_id(id: &str) -> String {
    if id.is_empty() { Uuid::new_v4().to_string() } else { id.to_owned() }
}
