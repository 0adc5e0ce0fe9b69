use serde_json::{json, Value};
use tracing::info;

use super::guard::{to_column_map, Target};
use crate::api::{ApiError, BoardApi};
use crate::model::value::FieldValue;

/// Wire form of a value for `change_multiple_column_values`.
pub fn serialize(value: &FieldValue) -> Value {
    match value {
        FieldValue::Empty => json!(""),
        FieldValue::Date(d) => json!({ "date": d.format("%Y-%m-%d").to_string() }),
        FieldValue::Status(s) | FieldValue::Text(s) | FieldValue::Malformed(s) => json!(s),
        // The display text mirrors the address.
        FieldValue::Email { email, .. } => json!({ "email": email, "text": email }),
        FieldValue::Link { url, text } => json!({ "url": url, "text": text }),
        FieldValue::Relation(ids) => json!({ "item_ids": ids }),
    }
}

/// Persist every change in one mutation. Nothing is retried here beyond the
/// client's own policy.
pub async fn write(
    api: &dyn BoardApi,
    board_id: u64,
    item_id: u64,
    changes: &[Target],
) -> Result<(), ApiError> {
    let values = to_column_map(changes);
    api.change_column_values(board_id, item_id, &values).await?;
    info!(
        board_id,
        item_id,
        columns = ?values.keys().collect::<Vec<_>>(),
        "column values written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{make_item, InMemoryBoard};
    use crate::model::value::ColumnKind;
    use chrono::NaiveDate;

    #[test]
    fn per_type_shapes() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(serialize(&FieldValue::Date(d)), json!({"date": "2025-03-09"}));
        assert_eq!(serialize(&FieldValue::Status("Done".into())), json!("Done"));
        assert_eq!(serialize(&FieldValue::Text("13422".into())), json!("13422"));
        assert_eq!(
            serialize(&FieldValue::Email { email: "a@b.co".into(), text: "A".into() }),
            json!({"email": "a@b.co", "text": "a@b.co"})
        );
        assert_eq!(
            serialize(&FieldValue::Link { url: "https://x/?id=1".into(), text: "1".into() }),
            json!({"url": "https://x/?id=1", "text": "1"})
        );
        assert_eq!(serialize(&FieldValue::Relation(vec![1, 2])), json!({"item_ids": [1, 2]}));
        assert_eq!(serialize(&FieldValue::Empty), json!(""));
    }

    #[tokio::test]
    async fn all_changes_go_in_one_call() {
        let board = InMemoryBoard::new(1, vec![make_item(5, "Gig", vec![])]);
        let changes = vec![
            Target::new("text_a", ColumnKind::Text, FieldValue::Text("a".into())),
            Target::new("text_b", ColumnKind::Text, FieldValue::Text("b".into())),
        ];
        write(&board, 1, 5, &changes).await.unwrap();

        let writes = board.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, 5);
        assert_eq!(writes[0].1.len(), 2);
    }

    #[tokio::test]
    async fn failures_propagate() {
        let board = InMemoryBoard::new(1, vec![make_item(5, "Gig", vec![])]).with_write_failure(5);
        let changes = vec![Target::new("t", ColumnKind::Text, FieldValue::Text("a".into()))];
        let err = write(&board, 1, 5, &changes).await.unwrap_err();
        assert!(err.message.contains("ColumnValueException"));
    }
}
