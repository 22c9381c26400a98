use super::models::NewBinding;
use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;
use std::io::BufRead;

/// Reads one record per line. Each record is a JSON object whose `id`
/// (string or integer) becomes the record id; the whole object is kept as
/// the binding source. Blank lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<NewBinding>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }
        let source: JsonValue = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {}", line_no))?;
        let record_id = match source.get("id") {
            Some(JsonValue::String(id)) if !id.is_empty() => id.clone(),
            Some(JsonValue::Number(id)) => id.to_string(),
            _ => bail!("Record on line {} has no string or integer \"id\"", line_no),
        };
        records.push(NewBinding { record_id, source });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_jsonl() {
        let input = "{\"id\": \"r1\", \"name\": \"Chair\"}\n\n{\"id\": 2, \"name\": \"Desk\"}\n";
        let records = read_jsonl(input.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_id, "r1");
        assert_eq!(records[0].source, json!({ "id": "r1", "name": "Chair" }));
        assert_eq!(records[1].record_id, "2");
    }

    #[test]
    fn test_read_jsonl_reports_line() {
        let input = "{\"id\": \"r1\"}\n{\"name\": \"no id\"}\n";
        let err = read_jsonl(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = read_jsonl("not json".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
