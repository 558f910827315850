//! Wire shapes of the Evolution HTTP API.

use serde::{Deserialize, Serialize};

pub const WEBHOOK_EVENTS: [&str; 2] = ["MESSAGES_UPSERT", "CONNECTION_UPDATE"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest<'a> {
    pub instance_name: &'a str,
    pub token: &'a str,
    pub qrcode: bool,
    pub integration: &'a str,
    pub webhook_events: [&'a str; 2],
    pub webhook_by_events: bool,
}

#[derive(Debug, Serialize)]
pub struct SetWebhookRequest<'a> {
    pub url: &'a str,
    pub webhook_by_events: bool,
    pub events: [&'a str; 2],
}

/// Body of `/instance/connect` and `/instance/qrcode`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub pairing_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionStateResponse {
    pub instance: InstanceState,
}

#[derive(Debug, Deserialize)]
pub struct InstanceState {
    pub state: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest<'a> {
    pub number: String,
    pub text_message: TextMessage<'a>,
}

#[derive(Debug, Serialize)]
pub struct TextMessage<'a> {
    pub text: &'a str,
}
