use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};

use crate::error::DownloadError;
use crate::models::{ChapterRecord, parse_number};

/// Releases grouped by chapter number, in order of first appearance.
#[derive(Debug, Default)]
pub struct ChapterGroup {
    groups: Vec<(String, Vec<ChapterRecord>)>,
}

impl ChapterGroup {
    pub fn from_chapters(chapters: &[ChapterRecord]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<ChapterRecord>)> = Vec::new();

        for chapter in chapters {
            match index.get(chapter.number.as_str()) {
                Some(&slot) => groups[slot].1.push(chapter.clone()),
                None => {
                    index.insert(chapter.number.as_str(), groups.len());
                    groups.push((chapter.number.clone(), vec![chapter.clone()]));
                }
            }
        }

        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn releases(&self, number: &str) -> Option<&[ChapterRecord]> {
        self.groups
            .iter()
            .find(|(n, _)| n == number)
            .map(|(_, releases)| releases.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ChapterRecord])> {
        self.groups.iter().map(|(n, releases)| (n.as_str(), releases.as_slice()))
    }

    /// Picks one release per number: the preferred scanlator's if the group has
    /// one, otherwise the first release.
    pub fn pick(&self, preferred: Option<&str>) -> Vec<ChapterRecord> {
        self.groups
            .iter()
            .filter_map(|(_, releases)| {
                let preferred_release = preferred.and_then(|name| {
                    releases
                        .iter()
                        .find(|release| release.group_name.as_deref() == Some(name))
                });
                preferred_release.or_else(|| releases.first()).cloned()
            })
            .collect()
    }
}

/// Distinct, non-empty scanlator names, sorted alphabetically.
pub fn scanlators(chapters: &[ChapterRecord]) -> Vec<String> {
    chapters
        .iter()
        .filter_map(|chapter| chapter.group_name.as_deref())
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Reduces `chapters` to exactly one release per chapter number, sorted by
/// numeric value. `preferred` of `None` or `"any"` means first available; it
/// only matters when more than one scanlator is present.
pub fn select_releases(chapters: &[ChapterRecord], preferred: Option<&str>) -> Vec<ChapterRecord> {
    let grouped = ChapterGroup::from_chapters(chapters);
    let preferred = preferred
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("any"));

    let mut selected = if scanlators(chapters).len() > 1 {
        debug!(
            "Selecting from {} chapter numbers, preferred scanlator: {}",
            grouped.len(),
            preferred.unwrap_or("any")
        );
        grouped.pick(preferred)
    } else {
        grouped.pick(None)
    };

    sort_by_number(&mut selected);
    selected
}

/// Stable ascending sort on the numeric value of each chapter number.
pub fn sort_by_number(chapters: &mut [ChapterRecord]) {
    chapters.sort_by(|a, b| {
        a.numeric_value()
            .partial_cmp(&b.numeric_value())
            .unwrap_or(Ordering::Equal)
    });
}

/// Chapter numbers carried by more than one release in `chapters`.
pub fn shared_numbers(chapters: &[ChapterRecord]) -> HashSet<String> {
    let mut seen = HashSet::new();
    chapters
        .iter()
        .filter(|chapter| !seen.insert(chapter.number.as_str()))
        .map(|chapter| chapter.number.clone())
        .collect()
}

/// Resolves a user selection string against the catalog.
///
/// Accepts `all`, single chapter numbers (every release of that number),
/// 1-based catalog positions, and inclusive numeric ranges such as `1-2.5`,
/// separated by commas. The result holds no duplicate chapter ids and keeps
/// selection order.
pub fn parse_selection(input: &str, chapters: &[ChapterRecord]) -> Result<Vec<ChapterRecord>, DownloadError> {
    let input = input.trim().to_lowercase().replace(' ', "");
    if input == "all" {
        return Ok(chapters.to_vec());
    }

    let mut selected: Vec<&ChapterRecord> = Vec::new();

    for part in input.split(',').filter(|part| !part.is_empty()) {
        if let Some((start, end)) = split_range(part) {
            let start = parse_number(start)
                .ok_or_else(|| DownloadError::Selection(format!("Invalid range: {}", part)))?;
            let end = parse_number(end)
                .ok_or_else(|| DownloadError::Selection(format!("Invalid range: {}", part)))?;

            selected.extend(chapters.iter().filter(|chapter| {
                parse_number(&chapter.number).is_some_and(|n| start <= n && n <= end)
            }));
            continue;
        }

        let by_number: Vec<&ChapterRecord> = chapters.iter().filter(|c| c.number == part).collect();
        if !by_number.is_empty() {
            selected.extend(by_number);
            continue;
        }

        // Numerically equal spellings such as "01" or "2.50"
        if let Some(n) = parse_number(part) {
            let by_value: Vec<&ChapterRecord> = chapters
                .iter()
                .filter(|c| parse_number(&c.number) == Some(n))
                .collect();
            if !by_value.is_empty() {
                selected.extend(by_value);
                continue;
            }
        }

        match part.parse::<usize>() {
            Ok(position) if position >= 1 && position <= chapters.len() => selected.push(&chapters[position - 1]),
            _ => warn!("Selection '{}' matches no chapter, ignoring", part),
        }
    }

    let mut seen = HashSet::new();
    Ok(selected
        .into_iter()
        .filter(|chapter| seen.insert(chapter.chapter_id))
        .cloned()
        .collect())
}

/// Splits `a-b` on the separating dash. A leading minus sign is not a separator.
fn split_range(part: &str) -> Option<(&str, &str)> {
    let idx = part.char_indices().skip(1).find(|&(_, c)| c == '-')?.0;
    Some((&part[..idx], &part[idx + 1..]))
}
