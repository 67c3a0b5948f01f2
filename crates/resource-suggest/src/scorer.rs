/// Keyword-overlap ranking of catalog resources against assessment tokens.
///
/// Pure: the output depends only on the catalog snapshot, the exclusion set
/// and the token set, so callers recompute whenever any of them changes.
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::model::ResourceRecord;

pub const MAX_SUGGESTIONS: usize = 8;
const MATCH_WEIGHT: u32 = 3;
const VERIFIED_BONUS: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionEntry {
    pub resource: ResourceRecord,
    pub score: u32,
    /// Matched tokens, keywords first, then service name / category tokens.
    pub matched: Vec<String>,
}

/// Rank `catalog` by token overlap, skipping resources without an ID and
/// resources in `excluded`. At most `MAX_SUGGESTIONS` entries, best first.
pub fn score_resources(
    catalog: &[ResourceRecord],
    excluded: &HashSet<String>,
    tokens: &HashSet<String>,
) -> Vec<SuggestionEntry> {
    let mut entries: Vec<SuggestionEntry> = catalog
        .iter()
        .filter_map(|resource| {
            let id = resource.resource_id()?;
            if excluded.contains(id) {
                return None;
            }
            let matched = matched_tokens(resource, tokens);
            if matched.is_empty() {
                return None;
            }
            let bonus = if resource.last_verified_at.is_some() {
                VERIFIED_BONUS
            } else {
                0
            };
            Some(SuggestionEntry {
                resource: resource.clone(),
                score: MATCH_WEIGHT * matched.len() as u32 + bonus,
                matched,
            })
        })
        .collect();

    // Stable: equal entries keep catalog order.
    entries.sort_by(rank);
    entries.truncate(MAX_SUGGESTIONS);
    entries
}

fn matched_tokens(resource: &ResourceRecord, tokens: &HashSet<String>) -> Vec<String> {
    let mut matched: Vec<String> = Vec::new();

    for keyword in &resource.keywords {
        let keyword = keyword.to_lowercase();
        if tokens.contains(&keyword) && !matched.contains(&keyword) {
            matched.push(keyword);
        }
    }

    let name = format!(
        "{} {}",
        resource.service_name,
        resource.category.as_deref().unwrap_or_default()
    );
    for piece in name.split(|c: char| c.is_whitespace() || c == '/') {
        let piece = piece.to_lowercase();
        if tokens.contains(&piece) && !matched.contains(&piece) {
            matched.push(piece);
        }
    }

    matched
}

/// Score descending, then verification time descending with unverified last.
fn rank(a: &SuggestionEntry, b: &SuggestionEntry) -> Ordering {
    b.score.cmp(&a.score).then_with(|| {
        match (a.resource.last_verified_at, b.resource.last_verified_at) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    })
}
