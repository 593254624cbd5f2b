//! Ordered provider chain with failover for report delivery.
//!
//! Providers are tried in configured order; the first successful send stops
//! the chain. Every attempt appends one `DeliveryRecord` to the audit
//! trail, and a report that was already delivered for a fingerprint +
//! recipient pair is never re-sent.

use crate::resend::ResendMailer;
use crate::sendgrid::SendGridMailer;
use crate::smtp::SmtpMailer;
use crate::traits::{Email, Mailer, Sender};
use sankey_common::config::MailConfig;
use sankey_store::{DeliveryRecord, ReportStore};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a delivery call.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Whether the email reached a provider successfully (now or earlier).
    pub delivered: bool,
    /// Provider that accepted the message, when delivered.
    pub provider: Option<String>,
    /// Attempts made by this call (0 when skipped as already sent).
    pub attempts: u32,
    /// True when a previous delivery made this call a no-op.
    pub already_sent: bool,
    /// Aggregated error text when all providers failed.
    pub error: Option<String>,
}

impl DeliveryReceipt {
    fn already_sent(provider: String) -> Self {
        Self {
            delivered: true,
            provider: Some(provider),
            attempts: 0,
            already_sent: true,
            error: None,
        }
    }

    fn sent(provider: String, attempts: u32) -> Self {
        Self {
            delivered: true,
            provider: Some(provider),
            attempts,
            already_sent: false,
            error: None,
        }
    }

    fn failed(attempts: u32, error: String) -> Self {
        Self {
            delivered: false,
            provider: None,
            attempts,
            already_sent: false,
            error: Some(error),
        }
    }
}

/// Dispatches report emails across an ordered provider chain.
pub struct Dispatcher {
    providers: Vec<Arc<dyn Mailer>>,
    store: Arc<dyn ReportStore>,
}

impl Dispatcher {
    /// Create a dispatcher with an explicit provider chain.
    pub fn new(providers: Vec<Arc<dyn Mailer>>, store: Arc<dyn ReportStore>) -> Self {
        Self { providers, store }
    }

    /// Build the provider chain from mail configuration.
    ///
    /// Unconfigured providers are skipped; unknown names in
    /// `provider_order` are logged and ignored. An empty chain is valid —
    /// delivery then always reports failure without attempts.
    pub fn from_config(config: &MailConfig, store: Arc<dyn ReportStore>) -> Self {
        let sender = Sender {
            address: config.from_address.clone(),
            name: config.from_name.clone(),
        };

        let mut providers: Vec<Arc<dyn Mailer>> = Vec::new();
        for name in &config.provider_order {
            match name.as_str() {
                "sendgrid" => {
                    if let Some(key) = config.sendgrid_api_key.as_deref() {
                        providers.push(Arc::new(SendGridMailer::new(key, sender.clone())));
                    }
                }
                "resend" => {
                    if let Some(key) = config.resend_api_key.as_deref() {
                        providers.push(Arc::new(ResendMailer::new(key, sender.clone())));
                    }
                }
                "smtp" => {
                    if let Some(smtp) = config.smtp.as_ref() {
                        providers.push(Arc::new(SmtpMailer::new(smtp.clone(), sender.clone())));
                    }
                }
                other => {
                    warn!(provider = other, "Unknown mail provider in provider_order, skipping");
                }
            }
        }

        if providers.is_empty() {
            warn!("No mail providers configured, report delivery disabled");
        } else {
            info!(
                chain = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
                "Mail provider chain configured"
            );
        }

        Self { providers, store }
    }

    /// Names of the configured providers, in order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Whether any provider is configured.
    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Deliver an email for a report fingerprint.
    ///
    /// Idempotent per (fingerprint, recipient): if a sent record already
    /// exists, the call is a no-op. Audit-trail write failures are logged
    /// but never abort the chain — losing a log line is better than losing
    /// the email.
    pub async fn deliver(
        &self,
        fingerprint: &str,
        recipient: &str,
        email: &Email,
    ) -> DeliveryReceipt {
        match self.store.find_sent_delivery(fingerprint, recipient).await {
            Ok(Some(previous)) => {
                info!(
                    fingerprint,
                    recipient,
                    provider = %previous.provider,
                    "Report already delivered, skipping"
                );
                return DeliveryReceipt::already_sent(previous.provider);
            }
            Ok(None) => {}
            Err(e) => {
                // Can't prove it was sent; attempting delivery is the
                // lesser risk only if the caller tolerates duplicates.
                // The audit trail is the idempotency source of truth, so
                // proceed and log.
                warn!(error = %e, fingerprint, "Delivery audit lookup failed, attempting anyway");
            }
        }

        if self.providers.is_empty() {
            return DeliveryReceipt::failed(0, "no mail providers configured".into());
        }

        let mut all_errors = Vec::new();

        for (idx, provider) in self.providers.iter().enumerate() {
            let attempt = idx as u32 + 1;
            let provider_name = provider.name();

            match provider.send(email).await {
                Ok(msg_id) => {
                    let record =
                        DeliveryRecord::sent(fingerprint, recipient, provider_name, attempt);
                    if let Err(e) = self.store.append_delivery(&record).await {
                        warn!(error = %e, fingerprint, "Failed to record sent delivery");
                    }
                    info!(
                        fingerprint,
                        recipient,
                        provider = provider_name,
                        attempt,
                        msg_id = %msg_id,
                        "Report delivered"
                    );
                    return DeliveryReceipt::sent(provider_name.to_string(), attempt);
                }
                Err(e) => {
                    let record = DeliveryRecord::failed(
                        fingerprint,
                        recipient,
                        provider_name,
                        attempt,
                        e.to_string(),
                    );
                    if let Err(append_err) = self.store.append_delivery(&record).await {
                        warn!(error = %append_err, fingerprint, "Failed to record failed delivery");
                    }

                    all_errors.push(format!("{provider_name}: {e}"));

                    if idx + 1 < self.providers.len() {
                        warn!(
                            failed_provider = provider_name,
                            next_provider = self.providers[idx + 1].name(),
                            error = %e,
                            "Mail provider failed, switching to fallback"
                        );
                    }
                }
            }
        }

        let attempts = self.providers.len() as u32;
        let error = format!("All mail providers failed: {}", all_errors.join("; "));
        error!(fingerprint, recipient, attempts, error = %error, "Report delivery failed");
        DeliveryReceipt::failed(attempts, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MailError, MailResult};
    use async_trait::async_trait;
    use sankey_store::{DeliveryOutcome, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock mailer for testing
    struct MockMailer {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fails: bool,
    }

    impl MockMailer {
        fn new(name: &'static str, fails: bool) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    name,
                    calls: Arc::clone(&calls),
                    fails,
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _email: &Email) -> MailResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                Err(MailError::SendFailed("provider down".into()))
            } else {
                Ok(format!("{}-msg", self.name))
            }
        }
    }

    fn make_email() -> Email {
        Email {
            to: "user@example.com".into(),
            subject: "Report".into(),
            html_body: "<p>report</p>".into(),
        }
    }

    #[tokio::test]
    async fn first_provider_success_stops_chain() {
        let store = Arc::new(MemoryStore::new());
        let (primary, primary_calls) = MockMailer::new("sendgrid", false);
        let (fallback, fallback_calls) = MockMailer::new("resend", false);

        let dispatcher = Dispatcher::new(vec![primary, fallback], store.clone());
        let receipt = dispatcher.deliver("fp1", "user@example.com", &make_email()).await;

        assert!(receipt.delivered);
        assert_eq!(receipt.provider.as_deref(), Some("sendgrid"));
        assert_eq!(receipt.attempts, 1);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.delivery_count().await, 1);
    }

    #[tokio::test]
    async fn failover_records_both_attempts() {
        let store = Arc::new(MemoryStore::new());
        let (primary, _) = MockMailer::new("sendgrid", true);
        let (fallback, _) = MockMailer::new("resend", false);

        let dispatcher = Dispatcher::new(vec![primary, fallback], store.clone());
        let receipt = dispatcher.deliver("fp1", "user@example.com", &make_email()).await;

        assert!(receipt.delivered);
        assert_eq!(receipt.provider.as_deref(), Some("resend"));
        assert_eq!(receipt.attempts, 2);

        let records = store.deliveries_for("fp1").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].provider, "sendgrid");
        assert_eq!(records[0].outcome, DeliveryOutcome::Failed);
        assert_eq!(records[1].provider, "resend");
        assert_eq!(records[1].outcome, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn all_providers_failing_reports_failure() {
        let store = Arc::new(MemoryStore::new());
        let (p1, _) = MockMailer::new("sendgrid", true);
        let (p2, _) = MockMailer::new("smtp", true);

        let dispatcher = Dispatcher::new(vec![p1, p2], store.clone());
        let receipt = dispatcher.deliver("fp1", "user@example.com", &make_email()).await;

        assert!(!receipt.delivered);
        assert_eq!(receipt.attempts, 2);
        let error = receipt.error.unwrap();
        assert!(error.contains("sendgrid"));
        assert!(error.contains("smtp"));
        assert_eq!(store.delivery_count().await, 2);
    }

    #[tokio::test]
    async fn second_delivery_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let (mailer, calls) = MockMailer::new("sendgrid", false);

        let dispatcher = Dispatcher::new(vec![mailer], store.clone());
        let first = dispatcher.deliver("fp1", "user@example.com", &make_email()).await;
        assert!(first.delivered);
        assert!(!first.already_sent);

        let second = dispatcher.deliver("fp1", "user@example.com", &make_email()).await;
        assert!(second.delivered);
        assert!(second.already_sent);
        assert_eq!(second.attempts, 0);

        // Exactly one send, exactly one sent record
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.delivery_count().await, 1);
    }

    #[tokio::test]
    async fn new_recipient_triggers_new_attempt() {
        let store = Arc::new(MemoryStore::new());
        let (mailer, calls) = MockMailer::new("sendgrid", false);

        let dispatcher = Dispatcher::new(vec![mailer], store.clone());
        dispatcher.deliver("fp1", "first@example.com", &make_email()).await;

        let mut email = make_email();
        email.to = "second@example.com".into();
        let receipt = dispatcher.deliver("fp1", "second@example.com", &email).await;

        assert!(receipt.delivered);
        assert!(!receipt.already_sent);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.delivery_count().await, 2);
    }

    #[tokio::test]
    async fn empty_chain_fails_without_records() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(vec![], store.clone());

        let receipt = dispatcher.deliver("fp1", "user@example.com", &make_email()).await;
        assert!(!receipt.delivered);
        assert_eq!(receipt.attempts, 0);
        assert_eq!(store.delivery_count().await, 0);
    }

    #[tokio::test]
    async fn chain_built_from_config_in_order() {
        let store = Arc::new(MemoryStore::new());
        let mut config = MailConfig::default();
        config.resend_api_key = Some("re-key".into());
        config.sendgrid_api_key = Some("sg-key".into());
        // smtp stays unconfigured and is skipped

        let dispatcher = Dispatcher::from_config(&config, store);
        assert_eq!(dispatcher.provider_names(), vec!["sendgrid", "resend"]);
        assert!(dispatcher.is_configured());
    }

    #[tokio::test]
    async fn custom_order_is_respected() {
        let store = Arc::new(MemoryStore::new());
        let mut config = MailConfig::default();
        config.provider_order = vec!["resend".into(), "sendgrid".into()];
        config.resend_api_key = Some("re-key".into());
        config.sendgrid_api_key = Some("sg-key".into());

        let dispatcher = Dispatcher::from_config(&config, store);
        assert_eq!(dispatcher.provider_names(), vec!["resend", "sendgrid"]);
    }

    #[tokio::test]
    async fn unconfigured_chain_from_config_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::from_config(&MailConfig::default(), store);
        assert!(!dispatcher.is_configured());
    }
}
