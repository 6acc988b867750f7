//! Table-safe splitting (§4.5 step 4, invariant I2).

use uuid::Uuid;

use crate::chunker::tokenizer::Tokenizer;

/// One part of a (possibly split) table, ready to become a chunk.
pub struct TablePart {
    pub content: String,
    pub token_count: u32,
    pub caption: Option<String>,
    pub table_group_id: Option<String>,
    pub page_start: u32,
    pub page_end: u32,
}

fn render_rows(header: &[String], rows: &[Vec<String>], caption: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(caption) = caption {
        out.push_str(caption);
        out.push('\n');
    }
    out.push_str(&header.join(" | "));
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(" | "));
        out.push('\n');
    }
    out
}

/// Splits a table into one or more parts, each under `max_tokens`, each
/// carrying the header row. Parts beyond the first never carry the caption
/// (it travels with part 1 only, per §4.5 step 4). A table that already
/// fits whole is returned as a single part with no `table_group_id`.
pub fn split_table(
    header: &[String],
    rows: &[Vec<String>],
    caption: Option<&str>,
    page_start: u32,
    page_end: u32,
    max_tokens: u32,
    tokenizer: &dyn Tokenizer,
) -> Vec<TablePart> {
    let whole = render_rows(header, rows, caption);
    let whole_tokens = tokenizer.count(&whole);
    if whole_tokens <= max_tokens {
        return vec![TablePart {
            content: whole,
            token_count: whole_tokens,
            caption: caption.map(str::to_string),
            table_group_id: None,
            page_start,
            page_end,
        }];
    }

    let group_id = Uuid::new_v4().to_string();
    let header_tokens = tokenizer.count(&header.join(" | "));
    let mut parts = Vec::new();
    let mut current_rows: Vec<Vec<String>> = Vec::new();
    let mut current_tokens = header_tokens;

    for row in rows {
        let row_text = row.join(" | ");
        let row_tokens = tokenizer.count(&row_text);
        if !current_rows.is_empty() && current_tokens + row_tokens > max_tokens {
            parts.push(current_rows.clone());
            current_rows.clear();
            current_tokens = header_tokens;
        }
        current_rows.push(row.clone());
        current_tokens += row_tokens;
    }
    if !current_rows.is_empty() {
        parts.push(current_rows);
    }

    parts
        .into_iter()
        .enumerate()
        .map(|(index, part_rows)| {
            let part_caption = if index == 0 { caption } else { None };
            let content = render_rows(header, &part_rows, part_caption);
            let token_count = tokenizer.count(&content);
            TablePart {
                content,
                token_count,
                caption: part_caption.map(str::to_string),
                table_group_id: Some(group_id.clone()),
                page_start,
                page_end,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::tokenizer::TiktokenTokenizer;

    fn header() -> Vec<String> {
        vec!["Parameter".into(), "Min".into(), "Max".into()]
    }

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n)
            .map(|i| vec![format!("Param {i}"), "0".into(), "100".into()])
            .collect()
    }

    #[test]
    fn small_table_is_single_part_with_no_group_id() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let parts = split_table(&header(), &rows(3), Some("Table 1"), 1, 1, 1000, &tokenizer);
        assert_eq!(parts.len(), 1);
        assert!(parts[0].table_group_id.is_none());
        assert_eq!(parts[0].caption.as_deref(), Some("Table 1"));
    }

    #[test]
    fn oversize_table_splits_with_shared_group_id_and_replicated_header() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let parts = split_table(&header(), &rows(200), Some("Table 1 - Params"), 1, 3, 50, &tokenizer);
        assert!(parts.len() >= 2);
        let group_id = parts[0].table_group_id.clone();
        assert!(group_id.is_some());
        for part in &parts {
            assert_eq!(part.table_group_id, group_id);
            assert!(part.content.contains("Parameter"));
        }
        assert_eq!(parts[0].caption.as_deref(), Some("Table 1 - Params"));
        assert!(parts[1].caption.is_none());
    }
}
