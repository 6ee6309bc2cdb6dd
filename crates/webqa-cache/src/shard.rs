//! Line-oriented shard file format.
//!
//! Each record is the query on one line, four lines per hit (title, url,
//! snippet, crawl date), then the `#EOR#` marker line.

use std::collections::HashMap;
use std::io::{self, Write};

use thiserror::Error;

use webqa_core::SearchHit;

pub const END_OF_RECORD: &str = "#EOR#";

/// Why a shard could not be parsed. The caller attaches the file path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ShardError(pub String);

/// Parse a whole shard into `(query, hits)` records in file order.
///
/// Hit ranks are their positions inside the record.
pub fn parse_shard(content: &str) -> Result<Vec<(String, Vec<SearchHit>)>, ShardError> {
    let mut lines = content.lines();
    let mut records = Vec::new();

    while let Some(query) = lines.next() {
        if query.is_empty() {
            continue;
        }

        let mut hits = Vec::new();
        loop {
            let title = match lines.next() {
                Some(END_OF_RECORD) => break,
                Some(line) => line,
                None => {
                    return Err(ShardError(format!(
                        "record for {query:?} has no {END_OF_RECORD} marker"
                    )))
                }
            };
            let mut field = |name: &str| {
                lines.next().ok_or_else(|| {
                    ShardError(format!(
                        "hit {} of {query:?} is truncated before its {name}",
                        hits.len()
                    ))
                })
            };
            let url = field("url")?;
            let snippet = field("snippet")?;
            let crawl_date = field("crawl date")?;
            hits.push(SearchHit::new(title, url, snippet, crawl_date, hits.len()));
        }

        records.push((query.to_string(), hits));
    }

    Ok(records)
}

/// Fields are single lines on disk.
fn one_line(field: &str) -> String {
    let is_break = |c: char| c == '\n' || c == '\r';
    if field.contains(is_break) {
        field
            .split(is_break)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        field.to_string()
    }
}

/// Write every entry, keys in lexicographic order.
pub fn write_shard<W: Write>(
    out: &mut W,
    entries: &HashMap<String, Vec<SearchHit>>,
) -> io::Result<()> {
    let mut queries: Vec<&String> = entries.keys().collect();
    queries.sort();

    for query in queries {
        writeln!(out, "{}", one_line(query))?;
        for hit in &entries[query] {
            writeln!(out, "{}", one_line(&hit.title))?;
            writeln!(out, "{}", one_line(&hit.url))?;
            writeln!(out, "{}", one_line(&hit.snippet))?;
            writeln!(out, "{}", one_line(&hit.crawl_date))?;
        }
        writeln!(out, "{END_OF_RECORD}")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_RECORDS: &str = "\
covid simptome
Simptome COVID
https://a.ro/simptome
Febră, tuse, oboseală
2021-03-01T10:00:00.000Z
Ghid
https://b.ro/ghid
Tusea seacă
2021-02-11T08:30:00.000Z
#EOR#
vaccin
#EOR#
";

    #[test]
    fn test_parse_records() {
        let records = parse_shard(TWO_RECORDS).unwrap();
        assert_eq!(records.len(), 2);

        let (query, hits) = &records[0];
        assert_eq!(query, "covid simptome");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].url, "https://b.ro/ghid");
        assert_eq!(hits[1].rank, 1);
        assert_eq!(hits[0].crawl_date, "2021-03-01T10:00:00.000Z");

        assert_eq!(records[1].0, "vaccin");
        assert!(records[1].1.is_empty());
    }

    #[test]
    fn test_parse_empty_and_blank_lines() {
        assert!(parse_shard("").unwrap().is_empty());
        let records = parse_shard("\nvaccin\n#EOR#\n\n").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_missing_end_marker() {
        let truncated = TWO_RECORDS.trim_end().trim_end_matches(END_OF_RECORD);
        let err = parse_shard(truncated).unwrap_err();
        assert!(err.to_string().contains("vaccin"));
    }

    #[test]
    fn test_truncated_hit() {
        let err = parse_shard("q\nTitle\nhttps://a.ro\n").unwrap_err();
        assert!(err.0.contains("snippet"));
    }

    #[test]
    fn test_write_sorted_keys() {
        let mut entries = HashMap::new();
        entries.insert("zebra".to_string(), Vec::new());
        entries.insert(
            "alfa".to_string(),
            vec![SearchHit::new("T", "https://a.ro", "S", "D", 0)],
        );
        let mut out = Vec::new();
        write_shard(&mut out, &entries).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "alfa\nT\nhttps://a.ro\nS\nD\n#EOR#\nzebra\n#EOR#\n"
        );
    }

    #[test]
    fn test_write_flattens_line_breaks() {
        let mut entries = HashMap::new();
        entries.insert(
            "q".to_string(),
            vec![SearchHit::new("T", "https://a.ro", "line one\r\nline two", "D", 0)],
        );
        let mut out = Vec::new();
        write_shard(&mut out, &entries).unwrap();
        let records = parse_shard(&String::from_utf8(out).unwrap()).unwrap();
        assert_eq!(records[0].1[0].snippet, "line one line two");
    }
}
