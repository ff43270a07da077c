use chrono::Month;

use crate::models::GenerationRequest;

const GENERATION_PROMPT: &str = r#"List {count} notable books first published in {month} {year}.

Prefer books with lasting cultural, literary or commercial significance. Only include books you are confident were published in that month.

Respond with JSON only, as an array of objects with these fields:
- "title": the book's title
- "author": the primary author's full name
- "publication_year": {year}
- "isbn": an ISBN-13 if you know it, otherwise null
- "significance": one sentence on why the book matters"#;

pub fn generation_prompt(request: &GenerationRequest) -> String {
    let month = u8::try_from(request.month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| format!("month {}", request.month));

    GENERATION_PROMPT
        .replace("{count}", &request.count.to_string())
        .replace("{month}", &month)
        .replace("{year}", &request.year.to_string())
}
