pub mod error;
pub mod monday;
pub mod retry;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::model::item::{Item, ItemsPage};
pub use error::ApiError;
pub use retry::RetryPolicy;

/// Read and write access to the external boards.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Fetch one item with all its column values. `None` if it doesn't exist.
    async fn fetch_item(&self, item_id: u64) -> Result<Option<Item>, ApiError>;

    /// Fetch one page of a board. `cursor: None` starts from the first page.
    async fn fetch_items_page(
        &self,
        board_id: u64,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ItemsPage, ApiError>;

    /// Overwrite several columns of one item in a single mutation.
    async fn change_column_values(
        &self,
        board_id: u64,
        item_id: u64,
        values: &Map<String, Value>,
    ) -> Result<(), ApiError>;
}
