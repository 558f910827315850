//! Evolution-style HTTP gateway
//!
//! Implements [`GatewayPort`] over the Evolution REST API. The remote
//! instance name is the session id. Every request carries the `apikey`
//! header.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use wl_core::ports::{ConnectionStatus, GatewayError, GatewayPort};
use wl_core::{OwnerId, PairingCode, SessionId};

use super::dto::{
    ConnectionStateResponse, CreateInstanceRequest, QrCodeResponse, SendTextRequest,
    SetWebhookRequest, TextMessage, WEBHOOK_EVENTS,
};

const INTEGRATION: &str = "WHATSAPP-BAILEYS";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub base_url: String,
    pub api_key: String,
    /// Registered on every new instance when set.
    pub webhook_url: Option<String>,
    pub request_timeout: Duration,
}

impl EvolutionConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            webhook_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

pub struct EvolutionGateway {
    client: reqwest::Client,
    config: EvolutionConfig,
}

impl EvolutionGateway {
    pub fn new(config: EvolutionConfig) -> anyhow::Result<Self> {
        if config.base_url.trim().is_empty() {
            anyhow::bail!("gateway base url is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build gateway HTTP client")?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Transient(format!("malformed gateway response: {err}")))
    }

    async fn register_webhook(&self, session_id: &SessionId, url: &str) {
        let body = SetWebhookRequest {
            url,
            webhook_by_events: false,
            events: WEBHOOK_EVENTS,
        };
        let request = self
            .request(Method::POST, &format!("/webhook/set/{session_id}"))
            .json(&body);
        match self.send(request).await {
            Ok(_) => tracing::debug!(%session_id, "webhook registered"),
            Err(err) => tracing::warn!(%session_id, error = %err, "webhook registration failed, relying on polling"),
        }
    }

    async fn qr_code(&self, path: String) -> Result<QrCodeResponse, GatewayError> {
        self.json(self.request(Method::GET, &path)).await
    }
}

#[async_trait]
impl GatewayPort for EvolutionGateway {
    async fn create_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        let body = CreateInstanceRequest {
            instance_name: session_id.as_str(),
            token: &self.config.api_key,
            qrcode: true,
            integration: INTEGRATION,
            webhook_events: WEBHOOK_EVENTS,
            webhook_by_events: false,
        };
        self.send(self.request(Method::POST, "/instance/create").json(&body))
            .await?;
        tracing::info!(%session_id, "remote instance created");

        if let Some(url) = &self.config.webhook_url {
            self.register_webhook(session_id, url).await;
        }
        Ok(())
    }

    async fn fetch_pairing_code(
        &self,
        session_id: &SessionId,
    ) -> Result<PairingCode, GatewayError> {
        let connect = self
            .qr_code(format!("/instance/connect/{session_id}"))
            .await?;
        if let Some(code) = image_code(&connect) {
            return Ok(code);
        }

        tracing::debug!(%session_id, "connect returned no QR image, asking qrcode endpoint");
        let fallback = self
            .qr_code(format!("/instance/qrcode/{session_id}"))
            .await?;
        if let Some(code) = image_code(&fallback) {
            return Ok(code);
        }

        // No image anywhere; the raw QR text is still scannable once rendered.
        text_code(&fallback)
            .or_else(|| text_code(&connect))
            .ok_or_else(|| GatewayError::Transient("QR code not generated yet".to_string()))
    }

    async fn connection_status(
        &self,
        session_id: &SessionId,
    ) -> Result<ConnectionStatus, GatewayError> {
        let response: ConnectionStateResponse = self
            .json(self.request(
                Method::GET,
                &format!("/instance/connectionState/{session_id}"),
            ))
            .await?;
        Ok(ConnectionStatus {
            open: response.instance.state == "open",
        })
    }

    async fn send_notification(
        &self,
        session_id: &SessionId,
        recipient: &OwnerId,
        text: &str,
    ) -> Result<(), GatewayError> {
        let body = SendTextRequest {
            number: format!("{}@s.whatsapp.net", recipient.digits()),
            text_message: TextMessage { text },
        };
        self.send(
            self.request(Method::POST, &format!("/message/sendText/{session_id}"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete_remote_session(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        let response = self
            .request(Method::DELETE, &format!("/instance/delete/{session_id}"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(%session_id, "remote instance already gone");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        tracing::info!(%session_id, "remote instance deleted");
        Ok(())
    }
}

/// Strip an optional data-URL prefix; blank images mean "not ready".
fn image_code(response: &QrCodeResponse) -> Option<PairingCode> {
    let base64 = response.base64.as_deref()?;
    let payload = match base64.split_once("base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => base64,
    };
    if payload.trim().is_empty() {
        return None;
    }

    let mut code = PairingCode::png_base64(payload.trim());
    if let Some(raw) = response.pairing_code.as_ref().or(response.code.as_ref()) {
        code = code.with_raw_code(raw.as_str());
    }
    Some(code)
}

fn text_code(response: &QrCodeResponse) -> Option<PairingCode> {
    let raw = response.code.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }

    let mut code = PairingCode::text(raw);
    if let Some(pairing_code) = &response.pairing_code {
        code = code.with_raw_code(pairing_code.as_str());
    }
    Some(code)
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Transient(format!("gateway request failed: {err}"))
}

/// 408, 429 and 5xx may succeed later; other statuses will not.
fn status_error(status: StatusCode, body: &str) -> GatewayError {
    let reason = format!("{} {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        GatewayError::Transient(reason)
    } else {
        GatewayError::Permanent(reason)
    }
}
