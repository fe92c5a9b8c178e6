use crate::core::dispatcher::{BatchDispatcher, DispatchOutcome, Progress};
use crate::core::template::{text_to_html, TemplateEngine};
use crate::core::Record;
use crate::domain::model::{
    GeneratedPitch, OutboundEmail, PitchStatus, PitchTemplate, SenderIdentity,
};
use crate::domain::ports::{EmailSender, PitchStore, QuotaStore, TextGenerator};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::is_plausible_email;
use std::time::Duration;

/// 不經文字生成，直接以模板填值建立草稿
pub fn draft_pitches(
    engine: &TemplateEngine,
    user_id: &str,
    template: &PitchTemplate,
    rows: &[Record],
) -> Vec<GeneratedPitch> {
    rows.iter()
        .map(|row| {
            let (subject, content) = engine.fill_template(template, row);
            GeneratedPitch::new(user_id, row.clone(), subject, content, PitchStatus::Draft)
        })
        .collect()
}

/// 取出收件地址；欄位不存在或格式不合時回傳 None
pub fn recipient_email(row: &Record, email_column: &str) -> Option<String> {
    let value = row.get_ignore_case(email_column)?.to_string();
    let trimmed = value.trim();
    is_plausible_email(trimmed).then(|| trimmed.to_string())
}

/// 以模板填值後的內容作為提示詞，逐列呼叫文字生成
pub struct PitchGenerator<G: TextGenerator> {
    generator: G,
    engine: TemplateEngine,
    dispatcher: BatchDispatcher,
}

impl<G: TextGenerator> PitchGenerator<G> {
    /// 依序呼叫，兩次呼叫間至少間隔 `delay`
    pub fn new(generator: G, delay: Duration) -> Result<Self> {
        Ok(Self {
            generator,
            engine: TemplateEngine::new()?,
            dispatcher: BatchDispatcher::sequential(delay),
        })
    }

    pub async fn generate<P>(
        &self,
        user_id: &str,
        template: &PitchTemplate,
        rows: Vec<Record>,
        progress: P,
    ) -> Vec<DispatchOutcome<GeneratedPitch>>
    where
        P: FnMut(Progress),
    {
        tracing::info!("🤖 Generating pitches for {} rows", rows.len());
        self.dispatcher
            .dispatch(
                rows,
                |row| async move {
                    let (subject, prompt) = self.engine.fill_template(template, &row);
                    let content = self.generator.generate(&prompt).await?;
                    Ok(GeneratedPitch::new(
                        user_id,
                        row,
                        subject,
                        content.trim().to_string(),
                        PitchStatus::Generated,
                    ))
                },
                progress,
            )
            .await
    }

    /// 將生成失敗的列存成 failed 推銷信，保留錯誤訊息；`rows` 與 `outcomes` 以 index 對應
    pub async fn record_failures<S: PitchStore>(
        &self,
        store: &S,
        user_id: &str,
        template: &PitchTemplate,
        rows: &[Record],
        outcomes: &[DispatchOutcome<GeneratedPitch>],
    ) -> Result<Vec<GeneratedPitch>> {
        let mut recorded = Vec::new();
        for outcome in outcomes {
            let (Err(error), Some(row)) = (&outcome.result, rows.get(outcome.index)) else {
                continue;
            };
            let (subject, _) = self.engine.fill_template(template, row);
            let mut pitch =
                GeneratedPitch::new(user_id, row.clone(), subject, String::new(), PitchStatus::Draft);
            pitch.mark_failed(error.user_friendly_message())?;
            pitch.id = Some(store.insert_pitch(&pitch).await?);
            tracing::debug!("📝 Recorded failed generation for row {}", outcome.index + 1);
            recorded.push(pitch);
        }
        Ok(recorded)
    }
}

/// 已寄出的推銷信；寄送成功但寫入失敗時帶著寫入錯誤
#[derive(Debug)]
pub struct PitchDelivery {
    pub pitch: GeneratedPitch,
    pub persistence_error: Option<EtlError>,
}

#[derive(Debug)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<DispatchOutcome<PitchDelivery>>,
}

/// 依額度分批寄送推銷信，並記錄每封的最終狀態
pub struct PitchSender<E, S, Q> {
    email: E,
    pitches: S,
    quota: Q,
    identity: SenderIdentity,
    email_column: String,
    name_column: Option<String>,
    dispatcher: BatchDispatcher,
}

impl<E, S, Q> PitchSender<E, S, Q>
where
    E: EmailSender,
    S: PitchStore,
    Q: QuotaStore,
{
    pub fn new(
        email: E,
        pitches: S,
        quota: Q,
        identity: SenderIdentity,
        email_column: impl Into<String>,
        dispatcher: BatchDispatcher,
    ) -> Self {
        Self {
            email,
            pitches,
            quota,
            identity,
            email_column: email_column.into(),
            name_column: None,
            dispatcher,
        }
    }

    /// 收件者姓名欄位，用於信件的收件人顯示名稱
    pub fn with_name_column(mut self, name_column: impl Into<String>) -> Self {
        self.name_column = Some(name_column.into());
        self
    }

    pub async fn send_all<P>(
        &self,
        user_id: &str,
        pitches: Vec<GeneratedPitch>,
        progress: P,
    ) -> Result<SendReport>
    where
        P: FnMut(Progress),
    {
        let total = pitches.len();
        let deliverable: Vec<(GeneratedPitch, String)> = pitches
            .into_iter()
            .filter(|pitch| !pitch.status.is_terminal() && !pitch.content.trim().is_empty())
            .filter_map(|pitch| {
                let to = recipient_email(&pitch.recipient_data, &self.email_column)?;
                Some((pitch, to))
            })
            .collect();
        let skipped = total - deliverable.len();

        if deliverable.is_empty() {
            return Err(EtlError::ValidationError {
                message: "No valid emails to send".to_string(),
            });
        }
        if skipped > 0 {
            tracing::warn!("⚠️ Skipping {} pitches without a usable recipient", skipped);
        }

        tracing::info!("📧 Sending {} emails for {}", deliverable.len(), user_id);
        let outcomes = self
            .dispatcher
            .dispatch_with_quota(
                &self.quota,
                user_id,
                deliverable,
                |(pitch, to)| self.deliver(pitch, to),
                progress,
            )
            .await?;

        let sent = outcomes.iter().filter(|o| o.is_success()).count();
        Ok(SendReport {
            sent,
            failed: outcomes.len() - sent,
            skipped,
            outcomes,
        })
    }

    async fn deliver(&self, mut pitch: GeneratedPitch, to: String) -> Result<PitchDelivery> {
        let to_name = self
            .name_column
            .as_deref()
            .and_then(|column| pitch.recipient_data.get_ignore_case(column))
            .map(|value| value.to_string().trim().to_string())
            .filter(|name| !name.is_empty());
        let email = OutboundEmail {
            to,
            to_name,
            subject: pitch.subject.clone(),
            text: pitch.content.clone(),
            html: text_to_html(&pitch.content),
        };

        match self.email.send(&self.identity, &email).await {
            Ok(receipt) => {
                pitch.mark_sent(receipt.message_id)?;
                tracing::debug!("✅ Sent to {}", email.to);
                let persistence_error = self.persist(&mut pitch).await.err();
                if let Some(e) = &persistence_error {
                    tracing::error!("💥 Sent to {} but could not record it: {}", email.to, e);
                }
                Ok(PitchDelivery {
                    pitch,
                    persistence_error,
                })
            }
            Err(send_error) => {
                pitch.mark_failed(send_error.user_friendly_message())?;
                if let Err(e) = self.persist(&mut pitch).await {
                    tracing::error!("💥 Could not record failure for {}: {}", email.to, e);
                }
                Err(send_error)
            }
        }
    }

    async fn persist(&self, pitch: &mut GeneratedPitch) -> Result<()> {
        match pitch.id.clone() {
            Some(id) => self.pitches.update_pitch(&id, pitch).await,
            None => {
                let id = self.pitches.insert_pitch(pitch).await?;
                pitch.id = Some(id);
                Ok(())
            }
        }
    }
}
