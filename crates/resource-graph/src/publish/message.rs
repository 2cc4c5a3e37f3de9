//! Message body, headers and delivery statuses of the ingestion format.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::graph::{Relation, RelationSet};
use crate::model::{Id, NIL_ID};

use super::preprocess::ReceiveModel;

/// Default operation recorded in the delivery chain.
pub const DEFAULT_OPERATION: &str = "add";

/// Fields shared by every model action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelActionFields {
    pub name_short_ru: Option<String>,
    pub group_id: Option<i64>,
    pub parent_model_id: Option<i64>,
    pub comments: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Copies another model into the target model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyModelAction {
    #[serde(flatten)]
    pub fields: ModelActionFields,
    pub source_model_id: i64,
    pub copy_data: bool,
    pub copy_tags: bool,
    pub copy_attributes: bool,
}

/// What to do with the target model before the data is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelAction {
    Create(ModelActionFields),
    Update(ModelActionFields),
    Upsert(ModelActionFields),
    CreateIfNotExists(ModelActionFields),
    CopyFrom(CopyModelAction),
}

/// Many-to-many links of one navigation, sent next to the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionModel {
    pub source_type: String,
    pub navigation_name: String,
    pub connections: Vec<Relation>,
    pub action: String,
}

impl ConnectionModel {
    pub fn new(
        source_type: impl Into<String>,
        navigation_name: impl Into<String>,
        connections: Vec<Relation>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            navigation_name: navigation_name.into(),
            connections,
            action: DEFAULT_OPERATION.to_string(),
        }
    }

    /// One connection model per relation key, in key order.
    pub fn from_relations(relations: &RelationSet) -> Vec<ConnectionModel> {
        relations
            .iter()
            .map(|((source_type, navigation_name), set)| {
                ConnectionModel::new(
                    source_type.as_str(),
                    navigation_name.as_str(),
                    set.iter().copied().collect(),
                )
            })
            .collect()
    }
}

/// Records of one type to delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAction {
    #[serde(rename = "type")]
    pub type_name: String,
    pub ids: Vec<Id>,
}

/// The serialised message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub message_id: Id,
    pub model_id: Id,
    pub model_action: Option<ModelAction>,
    pub data: Vec<ReceiveModel>,
    pub connections: Option<Vec<ConnectionModel>>,
    pub delete: Vec<DeleteAction>,
}

/// One hop in a message's chain of custody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageChainEntry {
    pub trace_id: Id,
    pub sender_id: String,
    pub operation: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl MessageChainEntry {
    pub fn new(trace_id: Id, sender_id: impl Into<String>, operation: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            trace_id,
            sender_id: sender_id.into(),
            operation: operation.into(),
            timestamp,
        }
    }
}

/// Outcome of one message upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub message_id: Id,
    pub is_loaded: bool,
    pub have_errors: bool,
    pub message: Option<String>,
}

impl LoadStatus {
    /// Nothing was sent because the input failed a precondition.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message_id: NIL_ID,
            is_loaded: false,
            have_errors: true,
            message: Some(message.into()),
        }
    }

    /// Nothing was sent because there was nothing to send.
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            message_id: NIL_ID,
            is_loaded: true,
            have_errors: false,
            message: Some(message.into()),
        }
    }
}

/// Combined outcome of a split upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadWithSplitStatus {
    pub is_loaded: bool,
    pub have_errors: bool,
    pub message_ids: Vec<Id>,
    pub message: String,
    pub statuses: Vec<LoadStatus>,
}

impl LoadWithSplitStatus {
    /// Loaded only if every chunk loaded; errors collects the messages of
    /// the chunks that reported errors, one per line.
    pub fn from_statuses(statuses: Vec<LoadStatus>) -> Self {
        let is_loaded = statuses.iter().all(|s| s.is_loaded);
        let message_ids = statuses
            .iter()
            .map(|s| s.message_id)
            .filter(|id| !id.is_nil())
            .collect();
        let failed: Vec<&LoadStatus> = statuses.iter().filter(|s| s.have_errors).collect();
        let message = failed
            .iter()
            .map(|s| s.message.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            is_loaded,
            have_errors: !failed.is_empty(),
            message_ids,
            message,
            statuses,
        }
    }
}
