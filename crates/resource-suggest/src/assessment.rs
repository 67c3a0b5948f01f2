/// Flattens an assessment document into the free-text strings it contains.
use serde_json::Value;

use crate::model::AssessmentDocument;

/// Collect every text leaf of `doc`: form -> category -> text, or
/// form -> category -> sub-category -> text. Deeper nesting and non-string
/// leaves are skipped.
pub fn extract_texts(doc: Option<&AssessmentDocument>) -> Vec<String> {
    let Some(doc) = doc else {
        return Vec::new();
    };

    let mut texts = Vec::new();
    for form in doc.0.values() {
        let Some(categories) = form.as_object() else {
            continue;
        };
        for value in categories.values() {
            match value {
                Value::String(text) => texts.push(text.clone()),
                Value::Object(sub_categories) => texts.extend(
                    sub_categories
                        .values()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
    }
    texts
}
