use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::state::NAME_FIELD;
use crate::scheduler::{BatchResult, ProgressEvent};
use crate::synthesis::IcpProfile;

pub type Record = Map<String, Value>;

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub companies: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub enriched_companies: BatchResult,
}

/// Single-company deep research request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpRequest {
    pub company_name: String,
    #[serde(default)]
    pub website: String,
    pub product: String,
    pub territory: String,
}

impl IcpRequest {
    pub fn into_record(self) -> Record {
        let mut record = Map::new();
        record.insert(NAME_FIELD.to_string(), Value::String(self.company_name));
        record.insert("website".to_string(), Value::String(self.website));
        record.insert("product".to_string(), Value::String(self.product));
        record.insert("territory".to_string(), Value::String(self.territory));
        record
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum IcpResponse {
    Enriched {
        enriched_data: String,
        profile: Option<IcpProfile>,
    },
    Error {
        error: String,
    },
}

/// Messages a WebSocket client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartEnrichment { companies: Vec<Record> },
}

/// Messages pushed to a WebSocket client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ItemComplete(ProgressEvent),
    EnrichmentComplete { data: BatchResult },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start_enrichment() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "start_enrichment",
            "companies": [{ "name": "Apple Inc.", "website": "apple.com" }]
        }))
        .unwrap();

        let ClientMessage::StartEnrichment { companies } = msg;
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0]["website"], "apple.com");
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({ "type": "stop" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_icp_request_maps_company_name() {
        let request: IcpRequest = serde_json::from_value(json!({
            "companyName": "Justworks",
            "website": "www.justworks.com",
            "product": "Justworks Payroll",
            "territory": "Atlanta Georgia"
        }))
        .unwrap();

        let record = request.into_record();
        assert_eq!(record["name"], "Justworks");
        assert_eq!(record["territory"], "Atlanta Georgia");
    }

    #[test]
    fn test_server_error_message_shape() {
        let value = serde_json::to_value(ServerMessage::Error {
            message: "bad request".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({ "type": "error", "message": "bad request" }));
    }
}
