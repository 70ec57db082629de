//! Delivery report webhook.
//!
//! Providers call back with the delivery id we handed them, either as query
//! parameters or as a JSON body. The call is always acknowledged with 200 so
//! providers do not retry reports we cannot match.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::metrics::DeliveryReportMetrics;
use crate::server::AppState;

use super::models::DeliveryReportAck;

/// Keys that may carry the delivery report id, compared case-insensitively
const ID_KEYS: [&str; 4] = ["id", "pk", "guid", "uuid"];

/// GET|POST /api/v1/delivery-reports
#[tracing::instrument(name = "api.delivery_report", skip_all)]
pub async fn delivery_report_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<DeliveryReportAck> {
    let payload = merge_payload(query, &body);

    let Some(report_id) = find_report_id(&payload) else {
        DeliveryReportMetrics::record_callback("missing_id");
        let payload = Value::Object(payload);
        tracing::warn!(payload = %payload, "Delivery report without id");
        return Json(DeliveryReportAck {
            matched: false,
            report_id: None,
        });
    };

    let mut report = match state.store.get_delivery_report(report_id).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            DeliveryReportMetrics::record_callback("unknown");
            tracing::warn!(report_id = %report_id, "Delivery report not found");
            return Json(DeliveryReportAck {
                matched: false,
                report_id: Some(report_id),
            });
        }
        Err(e) => {
            DeliveryReportMetrics::record_callback("error");
            tracing::error!(report_id = %report_id, error = %e, "Failed to load delivery report");
            return Json(DeliveryReportAck {
                matched: false,
                report_id: Some(report_id),
            });
        }
    };

    report.payload = Some(Value::Object(payload));
    match state.registry.get(&report.provider) {
        Ok(provider) => provider.parse_delivery_report(&mut report),
        Err(e) => tracing::warn!(provider = %report.provider, error = %e, "Cannot parse delivery report"),
    }
    report.updated_at = Utc::now();

    if let Err(e) = state.store.update_delivery_report(&report).await {
        DeliveryReportMetrics::record_callback("error");
        tracing::error!(report_id = %report_id, error = %e, "Failed to update delivery report");
        return Json(DeliveryReportAck {
            matched: false,
            report_id: Some(report_id),
        });
    }

    DeliveryReportMetrics::record_callback(report.status.as_str());
    tracing::info!(
        report_id = %report_id,
        provider = %report.provider,
        status = report.status.as_str(),
        "Delivery report updated"
    );
    Json(DeliveryReportAck {
        matched: true,
        report_id: Some(report_id),
    })
}

/// Query parameters overlaid with the fields of a JSON object body.
fn merge_payload(query: HashMap<String, String>, body: &[u8]) -> Map<String, Value> {
    let mut payload: Map<String, Value> = query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    if !body.is_empty() {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => payload.extend(fields),
            Ok(other) => tracing::debug!(body = %other, "Ignoring non-object delivery report body"),
            Err(e) => tracing::debug!(error = %e, "Ignoring unparsable delivery report body"),
        }
    }
    payload
}

fn find_report_id(payload: &Map<String, Value>) -> Option<Uuid> {
    payload
        .iter()
        .filter(|(key, _)| ID_KEYS.iter().any(|id| key.eq_ignore_ascii_case(id)))
        .find_map(|(_, value)| match value {
            Value::String(s) => Uuid::parse_str(s.trim()).ok(),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_report_id_ignores_key_case() {
        let id = Uuid::new_v4();
        let payload = merge_payload(HashMap::from([("GUID".to_string(), id.to_string())]), b"");
        assert_eq!(find_report_id(&payload), Some(id));
    }

    #[test]
    fn test_find_report_id_skips_non_uuid_values() {
        let id = Uuid::new_v4();
        let body = json!({"id": 42, "uuid": id}).to_string();
        let payload = merge_payload(HashMap::new(), body.as_bytes());
        assert_eq!(find_report_id(&payload), Some(id));

        let payload = merge_payload(HashMap::from([("pk".to_string(), "abc".to_string())]), b"");
        assert_eq!(find_report_id(&payload), None);
    }

    #[test]
    fn test_body_fields_override_query() {
        let body = json!({"status": "1"}).to_string();
        let payload = merge_payload(
            HashMap::from([("status".to_string(), "2".to_string())]),
            body.as_bytes(),
        );
        assert_eq!(payload["status"], json!("1"));
    }
}
