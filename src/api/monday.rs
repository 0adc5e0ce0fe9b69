use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::error::ApiError;
use super::retry::RetryPolicy;
use super::BoardApi;
use crate::model::item::{Item, ItemsPage, RawColumnValue};

pub const DEFAULT_API_URL: &str = "https://api.monday.com/v2";
pub const DEFAULT_API_VERSION: &str = "2024-10";

/// GraphQL client for the board API.
pub struct MondayClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    api_version: String,
    retry: RetryPolicy,
}

impl MondayClient {
    pub fn new(
        token: String,
        api_url: String,
        api_version: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url,
            token,
            api_version,
            retry,
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        label: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, ApiError> {
        let body = json!({ "query": query, "variables": variables });
        self.retry
            .run(label, || async {
                let resp = self
                    .client
                    .post(&self.api_url)
                    .header("Authorization", &self.token)
                    .header("API-Version", &self.api_version)
                    .header("Content-Type", "application/json")
                    .json(&body)
                    .send()
                    .await?;
                let status = resp.status().as_u16();
                let text = resp.text().await?;
                decode_response(status, &text)
            })
            .await
    }
}

const ITEM_FIELDS: &str = "id name board { id } column_values { id text value }";

fn item_query() -> String {
    format!("query ($ids: [ID!]) {{ items(ids: $ids) {{ {ITEM_FIELDS} }} }}")
}

fn first_page_query() -> String {
    format!(
        "query ($board: [ID!], $limit: Int!) {{ boards(ids: $board) {{ \
         items_page(limit: $limit) {{ cursor items {{ {ITEM_FIELDS} }} }} }} }}"
    )
}

fn next_page_query() -> String {
    format!(
        "query ($cursor: String!, $limit: Int!) {{ \
         next_items_page(cursor: $cursor, limit: $limit) {{ cursor items {{ {ITEM_FIELDS} }} }} }}"
    )
}

const CHANGE_VALUES_MUTATION: &str = "mutation ($board: ID!, $item: ID!, $values: JSON!) { \
     change_multiple_column_values(board_id: $board, item_id: $item, column_values: $values) { id } }";

#[derive(Debug, Deserialize)]
struct GqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GqlError>,
    error_message: Option<String>,
    status_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ItemsData {
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct BoardsData {
    boards: Vec<WireBoard>,
}

#[derive(Debug, Deserialize)]
struct WireBoard {
    items_page: WirePage,
}

#[derive(Debug, Deserialize)]
struct NextPageData {
    next_items_page: WirePage,
}

#[derive(Debug, Deserialize)]
struct WirePage {
    cursor: Option<String>,
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    name: String,
    board: Option<WireBoardRef>,
    #[serde(default)]
    column_values: Vec<RawColumnValue>,
}

#[derive(Debug, Deserialize)]
struct WireBoardRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MutationData {}

impl WireItem {
    fn into_item(self) -> Result<Item, ApiError> {
        let id = self
            .id
            .parse()
            .map_err(|_| ApiError::permanent(format!("non-numeric item id {:?}", self.id)))?;
        Ok(Item {
            id,
            name: self.name,
            board_id: self.board.and_then(|b| b.id.parse().ok()),
            column_values: self.column_values,
        })
    }
}

impl WirePage {
    fn into_page(self) -> Result<ItemsPage, ApiError> {
        Ok(ItemsPage {
            items: self
                .items
                .into_iter()
                .map(WireItem::into_item)
                .collect::<Result<_, _>>()?,
            cursor: self.cursor.filter(|c| !c.is_empty()),
        })
    }
}

/// Turn an HTTP status and body into data or an error carrying the first message.
fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    let parsed: Result<GqlResponse<T>, _> = serde_json::from_str(body);

    if !(200..300).contains(&status) {
        let message = parsed
            .ok()
            .and_then(|r| first_error(&r))
            .unwrap_or_else(|| truncate(body, 300));
        return Err(ApiError::classify(Some(status), message));
    }

    let response = parsed
        .map_err(|e| ApiError::permanent(format!("failed to parse API response: {e}")))?;
    if let Some(message) = first_error(&response) {
        return Err(ApiError::classify(response.status_code, message));
    }
    response
        .data
        .ok_or_else(|| ApiError::permanent("no data in API response"))
}

fn first_error<T>(response: &GqlResponse<T>) -> Option<String> {
    response
        .errors
        .first()
        .map(|e| e.message.clone())
        .or_else(|| response.error_message.clone())
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl BoardApi for MondayClient {
    async fn fetch_item(&self, item_id: u64) -> Result<Option<Item>, ApiError> {
        debug!(item_id, "fetching item");
        let data: ItemsData = self
            .execute("fetch_item", &item_query(), json!({ "ids": [item_id.to_string()] }))
            .await?;
        data.items
            .into_iter()
            .next()
            .map(WireItem::into_item)
            .transpose()
    }

    async fn fetch_items_page(
        &self,
        board_id: u64,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ItemsPage, ApiError> {
        debug!(board_id, ?cursor, limit, "fetching items page");
        match cursor {
            None => {
                let data: BoardsData = self
                    .execute(
                        "fetch_items_page",
                        &first_page_query(),
                        json!({ "board": [board_id.to_string()], "limit": limit }),
                    )
                    .await?;
                let board = data.boards.into_iter().next().ok_or_else(|| {
                    ApiError::permanent(format!("board {board_id} not found"))
                })?;
                board.items_page.into_page()
            }
            Some(cursor) => {
                let data: NextPageData = self
                    .execute(
                        "fetch_items_page",
                        &next_page_query(),
                        json!({ "cursor": cursor, "limit": limit }),
                    )
                    .await?;
                data.next_items_page.into_page()
            }
        }
    }

    async fn change_column_values(
        &self,
        board_id: u64,
        item_id: u64,
        values: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        let encoded = serde_json::to_string(values)
            .map_err(|e| ApiError::permanent(format!("failed to encode column values: {e}")))?;
        let _: MutationData = self
            .execute(
                "change_column_values",
                CHANGE_VALUES_MUTATION,
                json!({
                    "board": board_id.to_string(),
                    "item": item_id.to_string(),
                    "values": encoded,
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_item_payload() {
        let body = r#"{"data":{"items":[{"id":"123","name":"Load-in",
            "board":{"id":"456"},
            "column_values":[{"id":"date4","text":"2025-03-29","value":"{\"date\":\"2025-03-29\"}"},
                             {"id":"status","text":"Rehearsal","value":null}]}]}}"#;
        let data: ItemsData = decode_response(200, body).unwrap();
        let item = data.items.into_iter().next().unwrap().into_item().unwrap();
        assert_eq!(item.id, 123);
        assert_eq!(item.board_id, Some(456));
        assert_eq!(item.column_values.len(), 2);
        assert_eq!(item.column("status").unwrap().value, None);
    }

    #[test]
    fn graphql_errors_carry_first_message() {
        let body = r#"{"errors":[{"message":"Column not found"},{"message":"second"}]}"#;
        let err = decode_response::<ItemsData>(200, body).unwrap_err();
        assert_eq!(err.message, "Column not found");
        assert!(!err.is_transient());
    }

    #[test]
    fn error_message_field_is_an_error() {
        let body = r#"{"error_message":"Complexity budget exhausted","status_code":429}"#;
        let err = decode_response::<ItemsData>(200, body).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status, Some(429));
    }

    #[test]
    fn http_failures_are_classified() {
        let err = decode_response::<ItemsData>(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status, Some(502));
        assert_eq!(err.message, "<html>Bad Gateway</html>");

        let err = decode_response::<ItemsData>(401, r#"{"errors":[{"message":"Not Authenticated"}]}"#)
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(err.message, "Not Authenticated");
    }

    #[test]
    fn missing_data_is_permanent() {
        let err = decode_response::<ItemsData>(200, "{}").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn page_cursor_blank_means_done() {
        let body = r#"{"data":{"next_items_page":{"cursor":"","items":[]}}}"#;
        let data: NextPageData = decode_response(200, body).unwrap();
        let page = data.next_items_page.into_page().unwrap();
        assert!(page.cursor.is_none());
        assert!(page.items.is_empty());
    }

    #[test]
    fn mutation_response_decodes() {
        let body = r#"{"data":{"change_multiple_column_values":{"id":"123"}},"account_id":1}"#;
        assert!(decode_response::<MutationData>(200, body).is_ok());
    }

    #[tokio::test]
    async fn dropped_connections_are_retried() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicU32::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 64];
                let _ = socket.read(&mut buf).await;
                // Closing with unread request bytes makes the kernel send a reset.
                drop(socket);
            }
        });

        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        };
        let client = MondayClient::new(
            "token".into(),
            format!("http://{addr}/v2"),
            DEFAULT_API_VERSION.into(),
            Duration::from_secs(5),
            retry,
        )
        .unwrap();

        let err = client.fetch_item(1).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }
}
