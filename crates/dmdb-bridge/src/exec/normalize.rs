//! Result-set normalization into plain rows.

use super::{read_lob, RawValue, ResultSet};
use crate::core::value::{Row, SqlValue};
use crate::error::Result;

/// Fetch every row of a result set, draining large objects into text.
///
/// A result set that reports zero rows up front is closed without fetching.
/// The result set is closed on every path.
pub async fn collect_rows(mut rs: Box<dyn ResultSet>) -> Result<Vec<Row>> {
    let expected = rs.row_count();
    if expected == Some(0) {
        rs.close().await;
        return Ok(Vec::new());
    }
    let collected = drain(rs.as_mut(), expected).await;
    rs.close().await;
    collected
}

async fn drain(rs: &mut dyn ResultSet, expected: Option<u64>) -> Result<Vec<Row>> {
    let capacity = expected.and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
    let mut rows = Vec::with_capacity(capacity);
    while expected.map_or(true, |n| (rows.len() as u64) < n) {
        match rs.next_row().await? {
            Some(raw) => rows.push(normalize_row(raw).await?),
            None => break,
        }
    }
    Ok(rows)
}

/// Substitute every large-object handle with its drained text.
///
/// After the first failed drain the remaining handles are closed unread.
async fn normalize_row(raw: Vec<(String, RawValue)>) -> Result<Row> {
    let mut row = Row::new();
    let mut failure = None;
    for (column, value) in raw {
        match value {
            RawValue::Scalar(v) => row.insert(column, v),
            RawValue::StreamableBlob(mut reader) => {
                if failure.is_some() {
                    reader.close().await;
                    continue;
                }
                match read_lob(reader).await {
                    Ok(text) => row.insert(column, SqlValue::String(text)),
                    Err(e) => failure = Some(e),
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::exec::mock::{LobTracker, MockCell, MockResultSet};

    #[tokio::test]
    async fn test_zero_rows_short_circuits() {
        let (rs, tracker) = MockResultSet::new(vec![vec![(
            "id".to_string(),
            MockCell::Scalar(SqlValue::I64(1)),
        )]]);
        let rs = rs.reporting(Some(0));
        let rows = collect_rows(Box::new(rs)).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(tracker.fetches(), 0);
        assert_eq!(tracker.closes(), 1);
    }

    #[tokio::test]
    async fn test_blob_columns_become_text() {
        let lobs = LobTracker::default();
        let (rs, tracker) = MockResultSet::new(vec![
            vec![
                ("id".to_string(), MockCell::Scalar(SqlValue::I64(1))),
                ("body".to_string(), MockCell::lob("first body", 3, &lobs)),
            ],
            vec![
                ("id".to_string(), MockCell::Scalar(SqlValue::I64(2))),
                ("body".to_string(), MockCell::lob("second", 4, &lobs)),
            ],
        ]);
        let rows = collect_rows(Box::new(rs)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("body"), Some(&SqlValue::String("first body".into())));
        assert_eq!(rows[1].get("id"), Some(&SqlValue::I64(2)));
        assert_eq!(lobs.closes(), 2);
        assert_eq!(tracker.closes(), 1);
    }

    #[tokio::test]
    async fn test_unknown_row_count_fetches_until_exhausted() {
        let (rs, tracker) = MockResultSet::new(vec![
            vec![("n".to_string(), MockCell::Scalar(SqlValue::I32(1)))],
            vec![("n".to_string(), MockCell::Scalar(SqlValue::I32(2)))],
            vec![("n".to_string(), MockCell::Scalar(SqlValue::I32(3)))],
        ]);
        let rows = collect_rows(Box::new(rs.reporting(None))).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(tracker.fetches(), 4);
    }

    #[tokio::test]
    async fn test_blob_failure_fails_read_and_closes_everything() {
        let lobs = LobTracker::default();
        let (rs, tracker) = MockResultSet::new(vec![vec![
            ("a".to_string(), MockCell::failing_lob("broken", 2, 1, &lobs)),
            ("b".to_string(), MockCell::lob("never read", 2, &lobs)),
        ]]);
        let err = collect_rows(Box::new(rs)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Stream(_)));
        assert_eq!(lobs.closes(), 2);
        assert_eq!(tracker.closes(), 1);
    }
}
