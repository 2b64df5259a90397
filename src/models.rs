use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Band info. Open record: anything besides the known fields is kept
/// verbatim in `extra` and round-trips through storage and the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Band {
    /// Storage-assigned identity, immutable once assigned.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Idol info.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Idol {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub band_id: String,
    pub name: String,
    /// Content hash of the current preview image. Derived from the faces
    /// table at read time, never persisted on the idol row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregate snapshot of all known bands and idols, read under a single
/// storage transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profiles {
    pub bands: Vec<Band>,
    pub idols: Vec<Idol>,
}

impl Band {
    /// Rebuild a band from its storage row (id column + data JSON).
    pub fn from_parts(id: String, data: &str) -> Result<Band> {
        let mut band: Band =
            serde_json::from_str(data).with_context(|| format!("bad band data for {id}"))?;
        band.id = id;
        Ok(band)
    }

    /// JSON stored in the data column. The id lives in its own column and
    /// is stripped here to avoid duplication.
    pub fn storage_data(&self) -> Result<String> {
        let mut map = self.extra.clone();
        map.insert("name".to_owned(), Value::String(self.name.clone()));
        Ok(serde_json::to_string(&map)?)
    }
}

impl Idol {
    pub fn from_parts(id: String, band_id: String, data: &str) -> Result<Idol> {
        let mut idol: Idol =
            serde_json::from_str(data).with_context(|| format!("bad idol data for {id}"))?;
        idol.id = id;
        idol.band_id = band_id;
        Ok(idol)
    }

    /// JSON stored in the data column; id, band_id and the derived
    /// image_id are excluded.
    pub fn storage_data(&self) -> Result<String> {
        let mut map = self.extra.clone();
        map.insert("name".to_owned(), Value::String(self.name.clone()));
        Ok(serde_json::to_string(&map)?)
    }
}

/// Face bounding box in pixel coordinates.
///
/// Serialized as `[left, top, right, bottom]` in API payloads and as a
/// comma-separated string in the rect column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl From<[i32; 4]> for Rect {
    fn from([left, top, right, bottom]: [i32; 4]) -> Self {
        Rect { left, top, right, bottom }
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.left, r.top, r.right, r.bottom]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

impl FromStr for Rect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("bad rect string {s:?}"))?;
        if parts.len() != 4 {
            bail!("bad rect string {s:?}");
        }
        Ok(Rect { left: parts[0], top: parts[1], right: parts[2], bottom: parts[3] })
    }
}

/// Information about one recognized reference image, addressed by the
/// content hash of its raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub rect: Rect,
    #[serde(rename = "id")]
    pub idol_id: String,
    pub confirmed: bool,
}

/// Full faces-table row, as written by the import pipeline.
#[derive(Debug, Clone)]
pub struct FaceRow {
    pub image_id: String,
    pub idol_id: String,
    pub rect: Rect,
    pub descriptor: Vec<u8>,
    pub confirmed: bool,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn band_roundtrip_keeps_extra_fields() {
        let band = Band::from_parts(
            "b1".to_owned(),
            r#"{"name":"Orange Caramel","debut":"2010","members":3}"#,
        )
        .unwrap();
        assert_eq!(band.name, "Orange Caramel");
        assert_eq!(band.extra["debut"], json!("2010"));

        let data: Value = serde_json::from_str(&band.storage_data().unwrap()).unwrap();
        assert_eq!(data["members"], json!(3));
        assert!(data.get("id").is_none());
    }

    #[test]
    fn idol_storage_data_drops_derived_fields() {
        let mut idol =
            Idol::from_parts("i1".to_owned(), "b1".to_owned(), r#"{"name":"Raina"}"#).unwrap();
        idol.image_id = Some("deadbeef".to_owned());

        let data: Value = serde_json::from_str(&idol.storage_data().unwrap()).unwrap();
        assert_eq!(data, json!({"name": "Raina"}));

        let out = serde_json::to_value(&idol).unwrap();
        assert_eq!(out["image_id"], json!("deadbeef"));
        assert_eq!(out["band_id"], json!("b1"));
    }

    #[test]
    fn rect_string_roundtrip() {
        let rect = Rect { left: 10, top: 20, right: 110, bottom: 140 };
        assert_eq!(rect.to_string().parse::<Rect>().unwrap(), rect);
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("a,b,c,d".parse::<Rect>().is_err());
    }

    #[test]
    fn image_info_json_shape() {
        let info = ImageInfo {
            rect: Rect { left: 1, top: 2, right: 3, bottom: 4 },
            idol_id: "i1".to_owned(),
            confirmed: true,
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v, json!({"rect": [1, 2, 3, 4], "id": "i1", "confirmed": true}));
    }
}
