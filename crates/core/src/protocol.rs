//! Messages exchanged between the gateway and connected workers over the
//! worker WebSocket. Every frame is a JSON text message tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::progress::ProgressRecord;
use crate::task::GenerationRequest;

/// Worker → gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// First message after connecting.
    Register {
        rank: u32,
        world_size: u32,
        worker_name: String,
        /// Observers only publish progress and are never sent work.
        #[serde(default)]
        observer: bool,
    },
    Progress { record: ProgressRecord },
}

impl From<ProgressRecord> for WorkerMessage {
    fn from(record: ProgressRecord) -> Self {
        Self::Progress { record }
    }
}

/// Gateway → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Generate { request: GenerationRequest },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressStatus;
    use crate::types::TaskId;

    #[test]
    fn register_wire_format() {
        let msg = WorkerMessage::Register {
            rank: 1,
            world_size: 2,
            worker_name: "gpu-1".into(),
            observer: false,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "register",
                "rank": 1,
                "world_size": 2,
                "worker_name": "gpu-1",
                "observer": false,
            })
        );
    }

    #[test]
    fn register_defaults_to_task_worker() {
        let raw = r#"{"type":"register","rank":0,"world_size":1,"worker_name":"w"}"#;
        let msg: WorkerMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, WorkerMessage::Register { observer: false, .. }));
    }

    #[test]
    fn progress_message_parses() {
        let raw = r#"{"type":"progress","record":{"task_id":"abc","status":"LOADING_MODEL","timestamp":"2026-01-01T00:00:00Z"}}"#;
        let msg: WorkerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            WorkerMessage::Progress { record } => {
                assert_eq!(record.task_id, TaskId::from("abc"));
                assert_eq!(record.status, ProgressStatus::LoadingModel);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn generate_message_carries_request() {
        let msg = GatewayMessage::Generate {
            request: GenerationRequest::new("t2v", "a cat"),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: GatewayMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        assert!(text.starts_with(r#"{"type":"generate""#));
    }
}
