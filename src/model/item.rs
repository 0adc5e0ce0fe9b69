use serde::{Deserialize, Serialize};

/// One column entry exactly as the board API returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumnValue {
    pub id: String,
    /// Rendered display text, used when `value` is absent or unusable.
    #[serde(default)]
    pub text: Option<String>,
    /// JSON-encoded payload whose shape depends on the column type.
    #[serde(default)]
    pub value: Option<String>,
}

impl RawColumnValue {
    pub fn new(id: &str, text: Option<&str>, value: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            text: text.map(String::from),
            value: value.map(String::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<u64>,
    #[serde(default)]
    pub column_values: Vec<RawColumnValue>,
}

impl Item {
    pub fn column(&self, column_id: &str) -> Option<&RawColumnValue> {
        self.column_values.iter().find(|c| c.id == column_id)
    }
}

/// One page of a board listing plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct ItemsPage {
    pub items: Vec<Item>,
    pub cursor: Option<String>,
}
