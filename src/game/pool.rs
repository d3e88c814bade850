// Entrant pool bulk-loading from CSV roster files.
//
// Expected header: name,affiliation,odds,confirmed. Only `name` is required;
// odds are kept as text unless the cell parses as a bare number.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use super::entrant::{EntrantDraft, Odds};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to read pool file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Raw CSV row. Extra columns are ignored; missing optional columns
/// deserialize as empty strings.
#[derive(Debug, Deserialize)]
struct RawPoolRow {
    name: String,
    #[serde(default)]
    affiliation: String,
    #[serde(default)]
    odds: String,
    #[serde(default)]
    confirmed: Option<bool>,
}

/// Load an entrant pool from a CSV file on disk.
pub fn load_pool(path: &Path) -> Result<Vec<EntrantDraft>, PoolError> {
    let label = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| PoolError::Io {
        path: label.clone(),
        source,
    })?;
    parse_pool(file, &label)
}

/// Parse pool rows from any reader. Split out from [`load_pool`] so tests
/// can feed in-memory CSV without touching the filesystem.
pub fn parse_pool<R: Read>(reader: R, label: &str) -> Result<Vec<EntrantDraft>, PoolError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut drafts = Vec::new();
    for result in csv_reader.deserialize::<RawPoolRow>() {
        let row = result.map_err(|source| PoolError::Csv {
            path: label.to_string(),
            source,
        })?;

        if row.name.is_empty() {
            warn!("{label}: skipping row with blank entrant name");
            continue;
        }

        drafts.push(EntrantDraft {
            name: row.name,
            affiliation: (!row.affiliation.is_empty()).then_some(row.affiliation),
            odds: parse_odds(&row.odds),
            confirmed: row.confirmed.unwrap_or(false),
        });
    }

    Ok(drafts)
}

/// Interpret an odds cell: empty -> none, numeric -> number, else text.
fn parse_odds(cell: &str) -> Option<Odds> {
    if cell.is_empty() {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(n) => Some(Odds::Number(n)),
        Err(_) => Some(Odds::Text(cell.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv_text: &str) -> Vec<EntrantDraft> {
        parse_pool(csv_text.as_bytes(), "test.csv").unwrap()
    }

    #[test]
    fn parses_full_rows() {
        let drafts = parse(
            "name,affiliation,odds,confirmed\n\
             The Anvil,North Territory,5/2,true\n\
             Big Red,,12.5,false\n",
        );
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].name, "The Anvil");
        assert_eq!(drafts[0].affiliation.as_deref(), Some("North Territory"));
        assert_eq!(drafts[0].odds, Some(Odds::Text("5/2".into())));
        assert!(drafts[0].confirmed);

        assert!(drafts[1].affiliation.is_none());
        assert_eq!(drafts[1].odds, Some(Odds::Number(12.5)));
        assert!(!drafts[1].confirmed);
    }

    #[test]
    fn blank_names_are_skipped() {
        let drafts = parse(
            "name,affiliation,odds,confirmed\n\
             ,,,\n\
             Survivor,,,\n",
        );
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].name, "Survivor");
    }

    #[test]
    fn missing_optional_columns_default() {
        let drafts = parse("name\nLean Row\n");
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].affiliation.is_none());
        assert!(drafts[0].odds.is_none());
        assert!(!drafts[0].confirmed);
    }

    #[test]
    fn malformed_csv_surfaces_an_error() {
        let result = parse_pool(
            "name,confirmed\nBad Row,not-a-bool\n".as_bytes(),
            "test.csv",
        );
        assert!(matches!(result, Err(PoolError::Csv { .. })));
    }
}
