//! Reusable inbound parsing helpers.
//!
//! Two webhook shapes repeat across dozens of SMS aggregators: a form with
//! sender and body fields, and a form with an external id and a numeric
//! status code. Handlers built on these helpers stay a few lines long.

use courier_core::{Channel, MsgIn, MsgStatus, StatusUpdate, Urn};

use crate::error::ReceiveError;
use crate::request::WebhookRequest;

/// Parses a "form with `from` and `body` fields over phone URN" webhook:
/// extracts the sender, normalizes it into a phone URN for the channel's
/// country, and builds the incoming message.
pub fn receive_tel_form(
    channel: &Channel,
    request: &WebhookRequest,
    from_field: &str,
    body_field: &str,
) -> Result<MsgIn, ReceiveError> {
    let params = request.params();
    let from = params
        .get(from_field)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReceiveError::Validation(format!("missing required field: {from_field}")))?;
    let body = params.get(body_field).cloned().unwrap_or_default();

    let urn = Urn::from_tel_strict(from, channel.country())?;
    Ok(MsgIn::new(channel, urn, body, None))
}

/// Parses a "form with external-id and status-code fields" delivery report
/// against a closed status map. Unknown codes are 400 errors, never
/// silently coerced.
pub fn external_id_status(
    channel: &Channel,
    request: &WebhookRequest,
    status_map: &[(&str, MsgStatus)],
    id_field: &str,
    status_field: &str,
) -> Result<StatusUpdate, ReceiveError> {
    let params = request.params();
    let external_id = params
        .get(id_field)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReceiveError::Validation(format!("missing required field: {id_field}")))?;
    let code = params
        .get(status_field)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReceiveError::Validation(format!("missing required field: {status_field}")))?;

    let status = status_map
        .iter()
        .find(|(key, _)| key == code)
        .map(|(_, status)| *status)
        .ok_or_else(|| {
            let allowed: Vec<&str> = status_map.iter().map(|(key, _)| *key).collect();
            ReceiveError::UnknownStatus(format!(
                "{code}, must be one of: {}",
                allowed.join(", ")
            ))
        })?;

    Ok(StatusUpdate::by_external_id(channel, external_id.clone(), status))
}
