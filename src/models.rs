use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::downloader::sanitize_filename;
use crate::error::DownloadError;

/// Group name used for releases flagged official but without a scanlation group.
pub const OFFICIAL_GROUP: &str = "Official";

/// Manga metadata as returned by the service. Never mutated after it was fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MangaRecord {
    pub manga_id: Option<u64>,
    pub hash_id: Option<String>,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub slug: Option<String>,
    pub rank: Option<i64>,
    pub manga_type: Option<String>,
    pub poster_url: Option<String>,
    pub original_language: Option<String>,
    pub status: Option<String>,
    pub final_chapter: Option<String>,
    pub latest_chapter: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub year: Option<i64>,
    pub rated_avg: Option<f64>,
    pub rated_count: Option<u64>,
    pub follows_total: Option<u64>,
    pub is_nsfw: bool,
    pub genres: Vec<u64>,
    pub description: String,
}

impl MangaRecord {
    pub fn from_json(data: &Value) -> Result<Self, DownloadError> {
        if !data.is_object() {
            return Err(DownloadError::ParsingError(String::from("manga result is not an object")));
        }

        let poster = &data["poster"];
        Ok(Self {
            manga_id: data["manga_id"].as_u64(),
            hash_id: json_string(&data["hash_id"]),
            title: json_string(&data["title"]).unwrap_or_else(|| String::from("Unknown")),
            alt_titles: string_list(&data["alt_titles"]),
            slug: json_string(&data["slug"]),
            rank: data["rank"].as_i64(),
            manga_type: json_string(&data["type"]),
            poster_url: json_string(&poster["large"]).or_else(|| json_string(&poster["medium"])),
            original_language: json_string(&data["original_language"]),
            status: json_string(&data["status"]),
            final_chapter: json_string(&data["final_chapter"]),
            latest_chapter: json_string(&data["latest_chapter"]),
            start_date: json_string(&data["start_date"]),
            end_date: json_string(&data["end_date"]),
            year: data["year"].as_i64(),
            rated_avg: data["rated_avg"].as_f64(),
            rated_count: data["rated_count"].as_u64(),
            follows_total: data["follows_total"].as_u64(),
            is_nsfw: truthy(&data["is_nsfw"]),
            genres: data["term_ids"]
                .as_array()
                .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
                .unwrap_or_default(),
            description: json_string(&data["synopsis"]).unwrap_or_default(),
        })
    }

    /// Title usable as a directory name.
    pub fn safe_title(&self) -> String {
        let sanitized = sanitize_filename(self.title.trim());
        if sanitized.is_empty() {
            String::from("unknown")
        } else {
            sanitized
        }
    }
}

/// One release of one chapter. `chapter_id` is the only unique field; several
/// releases may share a `number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub chapter_id: u64,
    pub number: String,
    pub title: Option<String>,
    pub volume: Option<String>,
    pub votes: Option<i64>,
    pub group_name: Option<String>,
    pub pages_count: u32,
}

impl ChapterRecord {
    /// Builds a record from one item of a chapter listing page.
    pub fn from_json(item: &Value) -> Result<Self, DownloadError> {
        let chapter_id = item["chapter_id"]
            .as_u64()
            .ok_or_else(|| DownloadError::ParsingError(format!("chapter item without chapter_id: {}", item)))?;
        let number = json_string(&item["number"])
            .ok_or_else(|| DownloadError::ParsingError(format!("chapter {} has no number", chapter_id)))?;

        let group_name = match item["scanlation_group"]["name"].as_str() {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ if truthy(&item["is_official"]) => Some(OFFICIAL_GROUP.to_string()),
            _ => None,
        };

        Ok(Self {
            chapter_id,
            number,
            title: json_string(&item["name"]).or_else(|| json_string(&item["title"])),
            volume: json_string(&item["volume"]),
            votes: item["votes"].as_i64(),
            group_name,
            pages_count: item["pages_count"]
                .as_u64()
                .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
                .unwrap_or(0),
        })
    }

    /// Numeric value of `number`. Anything that does not look like a finite
    /// number counts as 0.
    pub fn numeric_value(&self) -> f64 {
        parse_number(&self.number).unwrap_or(0.0)
    }

    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => format!("Chapter {}: {}", self.number, title.trim()),
            _ => format!("Chapter {}", self.number),
        }
    }

    /// Directory (and container base) name for this chapter.
    pub fn dir_name(&self) -> String {
        sanitize_filename(&format!("Chapter {}", self.number))
    }

    /// Like `dir_name`, but unique per release for batches holding several
    /// releases of one number.
    pub fn release_dir_name(&self) -> String {
        sanitize_filename(&format!("Chapter {} {}", self.number, self.chapter_id))
    }
}

pub(crate) fn parse_number(input: &str) -> Option<f64> {
    input.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        _ => None,
    }
}

/// Integral floats such as `10.0` print as `10`, matching the string form.
fn number_text(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(json_string).collect())
        .unwrap_or_default()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}
