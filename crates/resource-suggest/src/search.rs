/// Free-text lookup over the resource catalog for caseworkers browsing by hand.
use crate::model::ResourceRecord;

pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Resources containing every whitespace-separated term of `query`
/// (case-insensitive substring match), in catalog order, at most `limit`.
pub fn search_catalog<'a>(
    catalog: &'a [ResourceRecord],
    query: &str,
    limit: usize,
) -> Vec<&'a ResourceRecord> {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return Vec::new();
    }

    catalog
        .iter()
        .filter(|r| {
            let haystack = haystack(r);
            terms.iter().all(|t| haystack.contains(t.as_str()))
        })
        .take(limit)
        .collect()
}

fn haystack(r: &ResourceRecord) -> String {
    let fields = [
        Some(r.service_name.as_str()),
        r.category.as_deref(),
        r.description.as_deref(),
        r.provider.as_deref(),
        r.location.as_deref(),
        r.target_users.as_deref(),
    ];
    let mut text: Vec<&str> = fields.into_iter().flatten().collect();
    text.extend(r.keywords.iter().map(String::as_str));
    text.join("\n").to_lowercase()
}
