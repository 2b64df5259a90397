use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::db::{self, Database};
use crate::engine::Descriptor;

/// In-memory training set for the classification resource.
///
/// `samples` and `categories` are parallel: sample i belongs to category
/// `categories[i]`, and `labels` maps each category back to an idol id.
#[derive(Debug, Default)]
pub struct TrainData {
    pub samples: Vec<Descriptor>,
    pub categories: Vec<i32>,
    pub labels: HashMap<i32, String>,
}

/// Assign categories by run-length grouping: every contiguous run of rows
/// sharing an idol id gets the next category id. Correct only because the
/// storage layer returns confirmed faces grouped by idol id; a violated
/// ordering would silently split an idol over several categories.
pub fn build_train_data(rows: &[(String, Vec<u8>)]) -> Result<TrainData> {
    let mut data = TrainData::default();
    let mut category = -1i32;
    let mut prev: Option<&str> = None;

    for (idol_id, blob) in rows {
        let descriptor = Descriptor::from_bytes(blob)
            .with_context(|| format!("bad descriptor for idol {idol_id}"))?;
        data.samples.push(descriptor);
        if prev != Some(idol_id.as_str()) {
            category += 1;
            data.labels.insert(category, idol_id.clone());
        }
        data.categories.push(category);
        prev = Some(idol_id);
    }

    Ok(data)
}

/// Query all confirmed descriptors and build the training set.
pub async fn load_train_data(pool: &Database) -> Result<TrainData> {
    let rows = db::get_train_rows(pool).await?;
    build_train_data(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DESCRIPTOR_LEN;

    fn row(idol_id: &str, fill: f32) -> (String, Vec<u8>) {
        (idol_id.to_owned(), Descriptor([fill; DESCRIPTOR_LEN]).to_bytes())
    }

    #[test]
    fn categories_follow_idol_runs() {
        let rows = vec![row("a", 0.1), row("a", 0.2), row("b", 0.3)];
        let data = build_train_data(&rows).unwrap();

        assert_eq!(data.samples.len(), data.categories.len());
        assert_eq!(data.categories, [0, 0, 1]);
        assert_eq!(data.labels[&0], "a");
        assert_eq!(data.labels[&1], "b");
        assert_eq!(data.samples[2], Descriptor([0.3; DESCRIPTOR_LEN]));
    }

    #[test]
    fn empty_rows_build_an_empty_set() {
        let data = build_train_data(&[]).unwrap();
        assert!(data.samples.is_empty());
        assert!(data.categories.is_empty());
        assert!(data.labels.is_empty());
    }

    #[test]
    fn corrupt_descriptor_fails_the_build() {
        let rows = vec![(String::from("a"), vec![1, 2, 3])];
        assert!(build_train_data(&rows).is_err());
    }
}
