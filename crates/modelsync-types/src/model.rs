//! Persisted model deployment records and the master key document
//!
//! Both live in the document store as JSON. Parsing is strict about the
//! fields reconciliation depends on and ignores everything else, so unrelated
//! model metadata (name, algorithm, connector, ...) is never touched.

use crate::{ModelId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Document field holding the model state
pub const MODEL_STATE_FIELD: &str = "model_state";
/// Document field holding the tenant id
pub const TENANT_ID_FIELD: &str = "tenant_id";
/// Document field holding the planned replica count
pub const PLANNING_WORKER_NODE_COUNT_FIELD: &str = "planning_worker_node_count";
/// Document field holding the last observed replica count
pub const CURRENT_WORKER_NODE_COUNT_FIELD: &str = "current_worker_node_count";
/// Document field holding the last update time (epoch millis)
pub const LAST_UPDATED_TIME_FIELD: &str = "last_updated_time";
/// Document field holding the encoded master key
pub const MASTER_KEY_FIELD: &str = "master_key";
/// Document field holding the master key creation time (epoch millis)
pub const CREATE_TIME_FIELD: &str = "create_time";

/// Deployment state of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    Registering,
    Registered,
    Deploying,
    Deployed,
    PartiallyDeployed,
    Undeployed,
    DeployFailed,
}

/// States the reconciler is allowed to correct
pub const RECONCILABLE_STATES: [ModelState; 4] = [
    ModelState::Deploying,
    ModelState::Deployed,
    ModelState::PartiallyDeployed,
    ModelState::DeployFailed,
];

impl ModelState {
    pub fn is_reconcilable(&self) -> bool {
        RECONCILABLE_STATES.contains(self)
    }

    /// Wire name as stored in documents
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Registering => "REGISTERING",
            ModelState::Registered => "REGISTERED",
            ModelState::Deploying => "DEPLOYING",
            ModelState::Deployed => "DEPLOYED",
            ModelState::PartiallyDeployed => "PARTIALLY_DEPLOYED",
            ModelState::Undeployed => "UNDEPLOYED",
            ModelState::DeployFailed => "DEPLOY_FAILED",
        }
    }
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while reading a persisted document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelRecordError {
    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Persisted deployment metadata of one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRecord {
    pub model_id: ModelId,
    pub tenant_id: Option<TenantId>,
    pub state: ModelState,
    pub planning_worker_node_count: u32,
    pub current_worker_node_count: u32,
    /// `None` when the document never recorded an update time
    pub last_updated_time: Option<DateTime<Utc>>,
}

impl ModelRecord {
    /// Parse a model document fetched from the model collection.
    pub fn from_document(model_id: ModelId, source: &Value) -> Result<Self, ModelRecordError> {
        let object = source.as_object().ok_or(ModelRecordError::NotAnObject)?;

        let state = match object.get(MODEL_STATE_FIELD) {
            None | Some(Value::Null) => {
                return Err(ModelRecordError::MissingField(MODEL_STATE_FIELD))
            }
            Some(value) => serde_json::from_value::<ModelState>(value.clone()).map_err(|e| {
                ModelRecordError::InvalidField {
                    field: MODEL_STATE_FIELD,
                    reason: e.to_string(),
                }
            })?,
        };

        let tenant_id = match object.get(TENANT_ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(tenant)) => Some(TenantId::new(tenant.clone())),
            Some(other) => {
                return Err(ModelRecordError::InvalidField {
                    field: TENANT_ID_FIELD,
                    reason: format!("expected string, got {}", other),
                })
            }
        };

        let planning_worker_node_count =
            read_count(object.get(PLANNING_WORKER_NODE_COUNT_FIELD), PLANNING_WORKER_NODE_COUNT_FIELD)?
                .ok_or(ModelRecordError::MissingField(PLANNING_WORKER_NODE_COUNT_FIELD))?;

        let current_worker_node_count =
            read_count(object.get(CURRENT_WORKER_NODE_COUNT_FIELD), CURRENT_WORKER_NODE_COUNT_FIELD)?
                .unwrap_or(0);

        let last_updated_time = read_millis(object.get(LAST_UPDATED_TIME_FIELD), LAST_UPDATED_TIME_FIELD)?;

        Ok(Self {
            model_id,
            tenant_id,
            state,
            planning_worker_node_count,
            current_worker_node_count,
            last_updated_time,
        })
    }

    /// Render the reconciliation-relevant fields as a document.
    pub fn to_document(&self) -> Value {
        let mut doc = json!({
            MODEL_STATE_FIELD: self.state,
            PLANNING_WORKER_NODE_COUNT_FIELD: self.planning_worker_node_count,
            CURRENT_WORKER_NODE_COUNT_FIELD: self.current_worker_node_count,
        });
        if let Some(tenant) = &self.tenant_id {
            doc[TENANT_ID_FIELD] = json!(tenant);
        }
        if let Some(updated) = self.last_updated_time {
            doc[LAST_UPDATED_TIME_FIELD] = json!(updated.timestamp_millis());
        }
        doc
    }
}

/// The singleton cluster-wide master key document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyRecord {
    /// Base64 encoded key material
    pub master_key: String,
    pub create_time: DateTime<Utc>,
}

impl MasterKeyRecord {
    pub fn new(master_key: impl Into<String>, create_time: DateTime<Utc>) -> Self {
        Self {
            master_key: master_key.into(),
            create_time,
        }
    }

    pub fn from_document(source: &Value) -> Result<Self, ModelRecordError> {
        let object = source.as_object().ok_or(ModelRecordError::NotAnObject)?;

        let master_key = match object.get(MASTER_KEY_FIELD) {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(ModelRecordError::MissingField(MASTER_KEY_FIELD))
            }
            Some(other) => {
                return Err(ModelRecordError::InvalidField {
                    field: MASTER_KEY_FIELD,
                    reason: format!("expected string, got {}", other),
                })
            }
        };

        let create_time = read_millis(object.get(CREATE_TIME_FIELD), CREATE_TIME_FIELD)?
            .ok_or(ModelRecordError::MissingField(CREATE_TIME_FIELD))?;

        Ok(Self {
            master_key,
            create_time,
        })
    }

    pub fn to_document(&self) -> Value {
        json!({
            MASTER_KEY_FIELD: self.master_key,
            CREATE_TIME_FIELD: self.create_time.timestamp_millis(),
        })
    }
}

fn read_count(value: Option<&Value>, field: &'static str) -> Result<Option<u32>, ModelRecordError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ModelRecordError::InvalidField {
                field,
                reason: format!("{} is not a valid node count", n),
            }),
        Some(other) => Err(ModelRecordError::InvalidField {
            field,
            reason: format!("expected number, got {}", other),
        }),
    }
}

fn read_millis(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ModelRecordError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| ModelRecordError::InvalidField {
                field,
                reason: format!("{} is not a valid epoch millis timestamp", n),
            }),
        Some(other) => Err(ModelRecordError::InvalidField {
            field,
            reason: format!("expected epoch millis, got {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_model_document() {
        let now = Utc::now();
        let doc = json!({
            "name": "kmeans-demo",
            "tenant_id": "tenant-a",
            "model_state": "PARTIALLY_DEPLOYED",
            "planning_worker_node_count": 3,
            "current_worker_node_count": 2,
            "last_updated_time": now.timestamp_millis(),
        });

        let record = ModelRecord::from_document(ModelId::new("m1"), &doc).unwrap();
        assert_eq!(record.state, ModelState::PartiallyDeployed);
        assert_eq!(record.tenant_id, Some(TenantId::new("tenant-a")));
        assert_eq!(record.planning_worker_node_count, 3);
        assert_eq!(record.current_worker_node_count, 2);
        assert_eq!(
            record.last_updated_time.unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
    }

    #[test]
    fn test_missing_current_count_defaults_to_zero() {
        let doc = json!({
            "model_state": "DEPLOYING",
            "planning_worker_node_count": 2,
        });

        let record = ModelRecord::from_document(ModelId::new("m1"), &doc).unwrap();
        assert_eq!(record.current_worker_node_count, 0);
        assert!(record.tenant_id.is_none());
        assert!(record.last_updated_time.is_none());
    }

    #[test]
    fn test_missing_state_is_rejected() {
        let doc = json!({ "planning_worker_node_count": 2 });
        assert_eq!(
            ModelRecord::from_document(ModelId::new("m1"), &doc),
            Err(ModelRecordError::MissingField(MODEL_STATE_FIELD))
        );
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let doc = json!({ "model_state": "EXPLODED", "planning_worker_node_count": 2 });
        assert!(matches!(
            ModelRecord::from_document(ModelId::new("m1"), &doc),
            Err(ModelRecordError::InvalidField { field: MODEL_STATE_FIELD, .. })
        ));
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let doc = json!({ "model_state": "DEPLOYED", "planning_worker_node_count": -1 });
        assert!(matches!(
            ModelRecord::from_document(ModelId::new("m1"), &doc),
            Err(ModelRecordError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_reconcilable_states() {
        assert!(ModelState::Deploying.is_reconcilable());
        assert!(ModelState::DeployFailed.is_reconcilable());
        assert!(!ModelState::Registered.is_reconcilable());
        assert!(!ModelState::Undeployed.is_reconcilable());
        assert_eq!(
            serde_json::to_value(ModelState::PartiallyDeployed).unwrap(),
            json!("PARTIALLY_DEPLOYED")
        );
    }

    #[test]
    fn test_master_key_document() {
        let record = MasterKeyRecord::new("a2V5", Utc::now());
        let parsed = MasterKeyRecord::from_document(&record.to_document()).unwrap();
        assert_eq!(parsed.master_key, "a2V5");

        assert_eq!(
            MasterKeyRecord::from_document(&json!({ "create_time": 1 })),
            Err(ModelRecordError::MissingField(MASTER_KEY_FIELD))
        );
    }
}
