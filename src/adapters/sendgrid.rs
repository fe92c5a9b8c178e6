use crate::core::template::text_to_html;
use crate::domain::model::{DeliveryReceipt, OutboundEmail, SenderIdentity};
use crate::domain::ports::EmailSender;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::Serialize;

pub const DEFAULT_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";
const DEFAULT_SCOPES_ENDPOINT: &str = "https://api.sendgrid.com/v3/scopes";
const TEST_SUBJECT: &str = "✅ Test Email Successful!";

const PROVIDER: &str = "sendgrid";
const MESSAGE_ID_HEADER: &str = "X-Message-Id";

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct MailSendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Address<'a>>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

impl<'a> MailSendRequest<'a> {
    fn new(sender: &'a SenderIdentity, email: &'a OutboundEmail) -> Self {
        // text/plain 必須排在 text/html 前面
        let mut content = Vec::with_capacity(2);
        if !email.text.is_empty() {
            content.push(Content {
                content_type: "text/plain",
                value: &email.text,
            });
        }
        if !email.html.is_empty() {
            content.push(Content {
                content_type: "text/html",
                value: &email.html,
            });
        }

        Self {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &email.to,
                    name: email.to_name.as_deref(),
                }],
            }],
            from: Address {
                email: &sender.from_email,
                name: Some(&sender.from_name).filter(|name| !name.is_empty()).map(String::as_str),
            },
            reply_to: sender.reply_to.as_deref().map(|email| Address { email, name: None }),
            subject: &email.subject,
            content,
        }
    }
}

/// SendGrid v3 `mail/send` 客戶端
#[derive(Debug, Clone)]
pub struct SendGridClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SendGridClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "delivery.api_key".to_string(),
            });
        }

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// 與寄信端點同一個 v3 根路徑下的 `scopes`
    fn scopes_endpoint(&self) -> String {
        self.endpoint
            .strip_suffix("/mail/send")
            .map(|root| format!("{}/scopes", root))
            .unwrap_or_else(|| DEFAULT_SCOPES_ENDPOINT.to_string())
    }

    /// 以 `GET /v3/scopes` 檢查金鑰；金鑰被拒時回傳 `Ok(false)`，連線失敗才是錯誤
    pub async fn validate_api_key(&self) -> Result<bool> {
        let url = self.scopes_endpoint();
        tracing::debug!("🔑 Checking API key against {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::provider_error(format!("Request failed: {}", e)))?;

        let valid = response.status().is_success();
        if !valid {
            tracing::warn!("🔑 API key rejected with status {}", response.status().as_u16());
        }
        Ok(valid)
    }

    /// 寄一封測試信，內容列出寄件者設定
    pub async fn send_test_email(&self, sender: &SenderIdentity, to: &str) -> Result<DeliveryReceipt> {
        let text = format!(
            "Test Email Successful!\n\n\
             Your email configuration is working correctly. You can now send property pitches to your leads.\n\n\
             Configuration Details:\n\
             From: {} <{}>\n\
             Sent at: {}",
            sender.from_name,
            sender.from_email,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let email = OutboundEmail {
            to: to.to_string(),
            to_name: None,
            subject: TEST_SUBJECT.to_string(),
            html: text_to_html(&text),
            text,
        };

        tracing::info!("🧪 Sending test email to {}", to);
        self.send(sender, &email).await
    }

    fn provider_error(message: impl Into<String>) -> EtlError {
        EtlError::ProviderError {
            provider: PROVIDER.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl EmailSender for SendGridClient {
    async fn send(&self, sender: &SenderIdentity, email: &OutboundEmail) -> Result<DeliveryReceipt> {
        if email.to.is_empty() || email.subject.is_empty() || (email.text.is_empty() && email.html.is_empty()) {
            return Err(EtlError::ValidationError {
                message: "Missing required fields: to, subject, and either text or html".to_string(),
            });
        }

        let request = MailSendRequest::new(sender, email);
        tracing::debug!("📡 Sending '{}' to {}", email.subject, email.to);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::provider_error(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body["errors"][0]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("SendGrid API error: {}", status.as_u16()));
            return Err(Self::provider_error(message));
        }

        let message_id = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(DeliveryReceipt { message_id })
    }
}
