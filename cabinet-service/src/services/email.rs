use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SmtpConfig;

/// Template variables for an invitation email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationEmail {
    /// `invite_politico`, `invite_chefe` or `invite_assessor`.
    pub template: &'static str,
    pub to: String,
    pub invited_name: String,
    /// Institution for politicians, cabinet name for team members.
    pub organization: Option<String>,
    pub accept_url: String,
    pub expires_in_hours: i64,
}

/// Email delivery collaborator. Returns the provider's dispatch identifier.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<String, AppError>;

    async fn send_two_factor_code(
        &self,
        to_email: &str,
        code: &str,
        expires_in_minutes: i64,
    ) -> Result<String, AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<String, AppError> {
        let dispatch_id = Uuid::new_v4().to_string();
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(subject)
            .message_id(Some(format!("<{}@cabinet-service>", dispatch_id)))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(dispatch_id = %dispatch_id, subject = %subject, "Email sent");
                Ok(dispatch_id)
            }
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

fn invitation_subject(email: &InvitationEmail) -> String {
    match (email.template, email.organization.as_deref()) {
        ("invite_politico", _) => "Seu convite para acessar o gabinete".to_string(),
        ("invite_chefe", Some(org)) => format!("Convite para chefiar o {}", org),
        (_, Some(org)) => format!("Convite para a equipe do {}", org),
        (_, None) => "Convite para a equipe do gabinete".to_string(),
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<String, AppError> {
        let subject = invitation_subject(email);
        let organization = email.organization.as_deref().unwrap_or("gabinete");

        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Olá, {name}!</h2>
        <p>Você foi convidado(a) para {organization}.</p>
        <p>
            <a href="{link}" style="background-color: #1d4ed8; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                Aceitar convite
            </a>
        </p>
        <p style="color: #666; font-size: 12px;">
            Este link expira em {hours} horas. Se você não esperava este convite, ignore este email.
        </p>
    </body>
</html>
"###,
            name = email.invited_name,
            organization = organization,
            link = email.accept_url,
            hours = email.expires_in_hours,
        );

        let plain_body = format!(
            "Olá, {}!\n\nVocê foi convidado(a) para {}.\n\nAceite o convite em: {}\n\nEste link expira em {} horas.",
            email.invited_name, organization, email.accept_url, email.expires_in_hours
        );

        self.send_email(&email.to, &subject, plain_body, html_body)
            .await
    }

    async fn send_two_factor_code(
        &self,
        to_email: &str,
        code: &str,
        expires_in_minutes: i64,
    ) -> Result<String, AppError> {
        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Seu código de verificação</h2>
        <p style="font-size: 28px; letter-spacing: 6px;"><strong>{}</strong></p>
        <p style="color: #666; font-size: 12px;">O código expira em {} minutos.</p>
    </body>
</html>
"###,
            code, expires_in_minutes
        );

        let plain_body = format!(
            "Seu código de verificação: {}\n\nO código expira em {} minutos.",
            code, expires_in_minutes
        );

        self.send_email(to_email, "Código de verificação", plain_body, html_body)
            .await
    }
}

/// Message captured by [`MockEmailService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    Invitation(InvitationEmail),
    TwoFactorCode { to: String, code: String },
}

/// Records messages instead of sending them. Can be switched to fail every dispatch.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Latest code sent to `to_email`.
    pub fn last_code_for(&self, to_email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|m| match m {
            SentEmail::TwoFactorCode { to, code } if to == to_email => Some(code),
            _ => None,
        })
    }

    pub fn invitations(&self) -> Vec<InvitationEmail> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                SentEmail::Invitation(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    fn record(&self, message: SentEmail) -> Result<String, AppError> {
        if self.fail {
            return Err(AppError::EmailError("mock provider rejected the message".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Mock mailer mutex poisoned: {}", e)))?
            .push(message);
        Ok(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_invitation(&self, email: &InvitationEmail) -> Result<String, AppError> {
        self.record(SentEmail::Invitation(email.clone()))
    }

    async fn send_two_factor_code(
        &self,
        to_email: &str,
        code: &str,
        _expires_in_minutes: i64,
    ) -> Result<String, AppError> {
        self.record(SentEmail::TwoFactorCode {
            to: to_email.to_string(),
            code: code.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_service_creation() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "mailer@example.com".to_string(),
            password: "secret".to_string(),
            from: "Gabinete <mailer@example.com>".to_string(),
        };

        assert!(EmailService::new(&config).is_ok());
    }

    #[test]
    fn team_subject_names_cabinet() {
        let email = InvitationEmail {
            template: "invite_assessor",
            to: "jane@example.com".into(),
            invited_name: "Jane".into(),
            organization: Some("Gabinete da Vereadora Ana Souza".into()),
            accept_url: "https://app/x".into(),
            expires_in_hours: 168,
        };
        assert_eq!(
            invitation_subject(&email),
            "Convite para a equipe do Gabinete da Vereadora Ana Souza"
        );
    }

    #[tokio::test]
    async fn mock_records_codes() {
        let mock = MockEmailService::new();
        mock.send_two_factor_code("a@b.com", "123456", 5).await.unwrap();
        assert_eq!(mock.last_code_for("a@b.com").as_deref(), Some("123456"));
        assert!(MockEmailService::failing()
            .send_two_factor_code("a@b.com", "1", 5)
            .await
            .is_err());
    }
}
