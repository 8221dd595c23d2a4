use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{EntityId, EntityKind},
    error::{ApiError, ApiException, ErrorCode},
};

/// Page context an [`AppEvent`] was raised from. Unrecognised names are kept
/// verbatim in `Other` and fall into the dispatcher's default bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageType {
    AppHome,
    Control,
    ComboSearch,
    List,
    New,
    Edit,
    Builder,
    Other(String),
}

impl PageType {
    pub fn as_str(&self) -> &str {
        match self {
            PageType::AppHome => "APPHOME",
            PageType::Control => "CONTROL",
            PageType::ComboSearch => "COMBO_SEARCH",
            PageType::List => "LIST",
            PageType::New => "NEW",
            PageType::Edit => "EDIT",
            PageType::Builder => "BUILDER",
            PageType::Other(raw) => raw,
        }
    }
}

impl From<String> for PageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "APPHOME" => PageType::AppHome,
            "CONTROL" => PageType::Control,
            "COMBO_SEARCH" => PageType::ComboSearch,
            "LIST" => PageType::List,
            "NEW" => PageType::New,
            "EDIT" => PageType::Edit,
            "BUILDER" => PageType::Builder,
            _ => PageType::Other(value),
        }
    }
}

impl From<&str> for PageType {
    fn from(value: &str) -> Self {
        PageType::from(value.to_string())
    }
}

impl From<PageType> for String {
    fn from(value: PageType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    FindRequest,
    BuildRequest,
    ControlRequest,
    HomeRequest,
    ListRequest,
    NewRequest,
    EditRequest,
    CancelRequest,
    Select,
    Add,
    Create,
    Update,
    Delete,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::FindRequest => "FIND_REQUEST",
            ActionType::BuildRequest => "BUILD_REQUEST",
            ActionType::ControlRequest => "CONTROL_REQUEST",
            ActionType::HomeRequest => "HOME_REQUEST",
            ActionType::ListRequest => "LIST_REQUEST",
            ActionType::NewRequest => "NEW_REQUEST",
            ActionType::EditRequest => "EDIT_REQUEST",
            ActionType::CancelRequest => "CANCEL_REQUEST",
            ActionType::Select => "SELECT",
            ActionType::Add => "ADD",
            ActionType::Create => "CREATE",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Other(raw) => raw,
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "FIND_REQUEST" => ActionType::FindRequest,
            "BUILD_REQUEST" => ActionType::BuildRequest,
            "CONTROL_REQUEST" => ActionType::ControlRequest,
            "HOME_REQUEST" => ActionType::HomeRequest,
            "LIST_REQUEST" => ActionType::ListRequest,
            "NEW_REQUEST" => ActionType::NewRequest,
            "EDIT_REQUEST" => ActionType::EditRequest,
            "CANCEL_REQUEST" => ActionType::CancelRequest,
            "SELECT" => ActionType::Select,
            "ADD" => ActionType::Add,
            "CREATE" => ActionType::Create,
            "UPDATE" => ActionType::Update,
            "DELETE" => ActionType::Delete,
            _ => ActionType::Other(value),
        }
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        ActionType::from(value.to_string())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Navigation/action signal raised by UI actions and subscription callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppEvent {
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    pub page_type: PageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_data: Option<Map<String, Value>>,
}

impl AppEvent {
    pub fn new(
        page_type: impl Into<PageType>,
        action_type: impl Into<ActionType>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            action_type: Some(action_type.into()),
            page_type: page_type.into(),
            entity_id: None,
            entity_data: None,
        }
    }

    pub fn with_entity_id(mut self, id: i64) -> Self {
        self.entity_id = Some(EntityId(id));
        self
    }

    pub fn with_entity_data(mut self, data: Map<String, Value>) -> Self {
        self.entity_data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Result of a create: the stored record as the data API assigned it, or the
/// errors that prevented the write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiError>,
}

impl MutationResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failed(error: ApiError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }

    pub fn into_result(self) -> Result<Value, ApiException> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error.into());
        }
        self.data.ok_or_else(|| ApiException {
            code: ErrorCode::Internal,
            message: "mutation response carried neither data nor errors".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// One entry of the subscription feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub collection: EntityKind,
    pub op: ChangeOp,
    pub record: Value,
}
