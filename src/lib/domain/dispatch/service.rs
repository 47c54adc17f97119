//! Dispatcher service

use std::sync::Arc;

use chrono::Utc;
use serde_yaml::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{DeliveryOutcome, DeliveryStatus, DispatchError, FailureReason, Report};
use crate::domain::{
    mailer::{Attachments, MessageBuilder, SendError, Session, SessionError, Transport},
    merge::{render_message, resolve},
    specification::{schema, Recipient, Specification},
};

/// Dispatcher settings that are not part of the document
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Refuse to send a message that still contains unresolved placeholders
    pub strict: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Sends one message per recipient over a single transport session
#[derive(Debug)]
pub struct Dispatcher<T>
where
    T: Transport,
{
    transport: Arc<T>,
    config: DispatchConfig,
}

impl<T> Dispatcher<T>
where
    T: Transport,
{
    /// Creates a new dispatcher
    pub fn new(transport: Arc<T>, config: DispatchConfig) -> Self {
        Self { transport, config }
    }

    /// Validates a raw document and dispatches it.
    ///
    /// An invalid document fails with [`DispatchError::Schema`] before the transport is touched.
    pub async fn run(&self, document: Value) -> Result<Report, DispatchError> {
        let spec = schema::validate(document)?;

        self.dispatch(&spec).await
    }

    /// Delivers a validated specification.
    ///
    /// # Arguments
    /// * `spec` - The [`Specification`] to deliver.
    ///
    /// # Returns
    /// - [`Ok`] with a [`Report`] holding one outcome per recipient, in recipient order.
    ///   Per-recipient failures (unresolved placeholders in strict mode, unbuildable messages,
    ///   rejected messages) are recorded there and never stop the batch.
    /// - [`Err`] with a [`DispatchError`] if a shared attachment is unreadable, the session
    ///   cannot be opened, or the session fails part way. In the last case the error carries
    ///   the full report, with every recipient not yet sent marked as failed.
    pub async fn dispatch(&self, spec: &Specification) -> Result<Report, DispatchError> {
        let batch_id = Uuid::now_v7();

        self.dispatch_batch(batch_id, spec)
            .instrument(info_span!("batch", %batch_id))
            .await
    }

    async fn dispatch_batch(
        &self,
        batch_id: Uuid,
        spec: &Specification,
    ) -> Result<Report, DispatchError> {
        let started_at = Utc::now();

        info!(
            recipients = spec.recipients().len(),
            strict = self.config.strict,
            "starting batch"
        );

        let attachments = Attachments::load(&spec.template().attachments)?;
        let builder = MessageBuilder::new(spec, &attachments)?;

        let mut session = self
            .transport
            .open(spec.transport())
            .await
            .map_err(|err| {
                error!(
                    host = %spec.transport().host,
                    error = %err,
                    "could not open transport session"
                );

                DispatchError::Open(err)
            })?;

        let mut outcomes = Vec::with_capacity(spec.recipients().len());
        let mut lost: Option<SessionError> = None;

        for recipient in spec.recipients() {
            let status = match &lost {
                Some(err) => DeliveryStatus::Failed(FailureReason::Session(err.to_string())),
                None => match self.deliver(&mut session, &builder, spec, recipient).await {
                    Ok(status) => status,
                    Err(err) => {
                        error!(
                            recipient = %recipient.address(),
                            error = %err,
                            "transport session failed, abandoning remaining recipients"
                        );

                        let reason = FailureReason::Session(err.to_string());
                        lost = Some(err);

                        DeliveryStatus::Failed(reason)
                    }
                },
            };

            outcomes.push(DeliveryOutcome {
                address: recipient.address().clone(),
                status,
            });
        }

        if let Err(err) = session.close().await {
            warn!(error = %err, "could not close transport session cleanly");
        }

        let report = Report::new(batch_id, started_at, outcomes);
        let summary = report.summary();

        info!(
            sent = summary.sent,
            warnings = summary.sent_with_warnings,
            failed = summary.failed,
            "batch finished"
        );

        match lost {
            Some(source) => Err(DispatchError::SessionLost {
                source,
                report: Box::new(report),
            }),
            None => Ok(report),
        }
    }

    /// Renders, builds and sends one recipient's message.
    ///
    /// Only a session failure is returned as an error; everything else is an outcome.
    async fn deliver(
        &self,
        session: &mut T::Session,
        builder: &MessageBuilder<'_>,
        spec: &Specification,
        recipient: &Recipient,
    ) -> Result<DeliveryStatus, SessionError> {
        let address = recipient.address();
        let fields = resolve(spec.fields(), recipient.fields());
        let rendered = render_message(spec.template(), &fields);
        let unresolved: Vec<String> = rendered.unresolved.iter().cloned().collect();

        if !unresolved.is_empty() && self.config.strict {
            warn!(recipient = %address, ?unresolved, "unresolved placeholders, not sending");

            return Ok(DeliveryStatus::Failed(FailureReason::Unresolved(unresolved)));
        }

        let message = match builder.build(recipient, rendered) {
            Ok(message) => message,
            Err(err) => {
                warn!(recipient = %address, error = %err, "could not build message");

                return Ok(DeliveryStatus::Failed(FailureReason::Build(err.to_string())));
            }
        };

        debug!(recipient = %address, "sending");

        match session.send(&message).await {
            Ok(()) if unresolved.is_empty() => {
                info!(recipient = %address, "sent");

                Ok(DeliveryStatus::Sent)
            }
            Ok(()) => {
                warn!(recipient = %address, ?unresolved, "sent with unresolved placeholders");

                Ok(DeliveryStatus::SentWithWarnings { unresolved })
            }
            Err(SendError::Rejected(reason)) => {
                warn!(recipient = %address, %reason, "message rejected");

                Ok(DeliveryStatus::Failed(FailureReason::Rejected(reason)))
            }
            Err(SendError::Session(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::{predicate::always, Sequence};
    use testresult::TestResult;

    use crate::domain::{
        mailer::{MockSession, MockTransport, TransportMessage},
        specification::EmailAddress,
    };

    use super::*;

    const SPEC: &str = r#"
sender:
  address: news@example.com
transport:
  host: smtp.example.com
fields:
  company: Acme
template:
  subject: "Hello {{name}} from {{company}}"
  body: "Dear {{name}}"
recipients:
  - address: a@example.com
    fields:
      name: Alice
  - address: b@example.com
    fields:
      name: Bob
"#;

    fn spec(text: &str) -> Specification {
        Specification::from_yaml_str(text).expect("test specification is valid")
    }

    fn to(address: &'static str) -> impl Fn(&TransportMessage) -> bool {
        move |message| message.recipient().as_str() == address
    }

    fn subject_of(message: &TransportMessage) -> String {
        String::from_utf8(message.formatted())
            .unwrap_or_default()
            .lines()
            .find_map(|line| line.strip_prefix("Subject: ").map(str::to_string))
            .unwrap_or_default()
    }

    fn transport_with(session: MockSession) -> MockTransport {
        let mut transport = MockTransport::new();

        transport
            .expect_open()
            .times(1)
            .return_once(move |_| Ok(session));

        transport
    }

    fn dispatcher(transport: MockTransport, strict: bool) -> Dispatcher<MockTransport> {
        Dispatcher::new(Arc::new(transport), DispatchConfig { strict })
    }

    #[tokio::test]
    async fn test_dispatch_sends_rendered_messages_in_order() -> TestResult {
        let mut session = MockSession::new();
        let mut sequence = Sequence::new();

        session
            .expect_send()
            .withf(|message| subject_of(message) == "Hello Alice from Acme")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        session
            .expect_send()
            .withf(|message| subject_of(message) == "Hello Bob from Acme")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        session
            .expect_close()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Ok(()));

        let report = dispatcher(transport_with(session), true)
            .dispatch(&spec(SPEC))
            .await?;

        assert_eq!(
            report.outcomes,
            vec![
                DeliveryOutcome {
                    address: spec(SPEC).recipients()[0].address().clone(),
                    status: DeliveryStatus::Sent,
                },
                DeliveryOutcome {
                    address: spec(SPEC).recipients()[1].address().clone(),
                    status: DeliveryStatus::Sent,
                },
            ]
        );
        assert!(report.summary().all_sent());

        Ok(())
    }

    #[tokio::test]
    async fn test_opens_one_session_for_the_whole_batch() -> TestResult {
        let recipients: String = (0..5)
            .map(|i| format!("  - address: r{i}@example.com\n    fields:\n      name: R{i}\n"))
            .collect();
        let text = format!(
            "{}recipients:\n{recipients}",
            SPEC.split("recipients:").next().unwrap_or_default()
        );

        let mut session = MockSession::new();
        session.expect_send().times(5).returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let mut transport = MockTransport::new();
        transport
            .expect_open()
            .with(always())
            .times(1)
            .return_once(move |_| Ok(session));

        let report = dispatcher(transport, true).dispatch(&spec(&text)).await?;

        assert_eq!(
            report
                .outcomes
                .iter()
                .map(|outcome| outcome.address.to_string())
                .collect::<Vec<_>>(),
            (0..5).map(|i| format!("r{i}@example.com")).collect::<Vec<_>>()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_message_does_not_abort_batch() -> TestResult {
        let mut session = MockSession::new();

        session
            .expect_send()
            .withf(to("a@example.com"))
            .times(1)
            .returning(|_| Err(SendError::Rejected("550 mailbox unavailable".to_string())));
        session
            .expect_send()
            .withf(to("b@example.com"))
            .times(1)
            .returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let report = dispatcher(transport_with(session), true)
            .dispatch(&spec(SPEC))
            .await?;

        assert_eq!(
            report.outcomes[0].status,
            DeliveryStatus::Failed(FailureReason::Rejected(
                "550 mailbox unavailable".to_string()
            ))
        );
        assert_eq!(report.outcomes[1].status, DeliveryStatus::Sent);

        let summary = report.summary();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].address.as_str(), "a@example.com");

        Ok(())
    }

    #[tokio::test]
    async fn test_unbuildable_message_does_not_abort_batch() -> TestResult {
        // Validation refuses such addresses, so a hand-built specification stands in for a
        // message the mail library cannot assemble.
        let valid = spec(SPEC);
        let unbuildable = Specification::new(
            valid.origin().clone(),
            valid.transport().clone(),
            valid.fields().clone(),
            valid.template().clone(),
            vec![
                Recipient::new(
                    EmailAddress::unchecked("a,b@example.com"),
                    None,
                    valid.recipients()[0].fields().clone(),
                ),
                valid.recipients()[1].clone(),
            ],
        );

        let mut session = MockSession::new();
        session
            .expect_send()
            .withf(to("b@example.com"))
            .times(1)
            .returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let report = dispatcher(transport_with(session), true)
            .dispatch(&unbuildable)
            .await?;

        assert!(matches!(
            &report.outcomes[0].status,
            DeliveryStatus::Failed(FailureReason::Build(reason)) if reason.contains("a,b@example.com")
        ));
        assert_eq!(report.outcomes[1].status, DeliveryStatus::Sent);

        let summary = report.summary();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_lenient_mode_sends_with_warnings() -> TestResult {
        let text = SPEC.replace("    fields:\n      name: Alice\n", "");

        let mut session = MockSession::new();
        session
            .expect_send()
            .withf(|message| subject_of(message) == "Hello {{name}} from Acme")
            .times(1)
            .returning(|_| Ok(()));
        session
            .expect_send()
            .withf(to("b@example.com"))
            .times(1)
            .returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let report = dispatcher(transport_with(session), false)
            .dispatch(&spec(&text))
            .await?;

        assert_eq!(
            report.outcomes[0].status,
            DeliveryStatus::SentWithWarnings {
                unresolved: vec!["name".to_string()]
            }
        );
        assert_eq!(report.summary().sent_with_warnings, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_strict_mode_fails_recipient_with_unresolved_placeholders() -> TestResult {
        let text = SPEC.replace("    fields:\n      name: Alice\n", "");

        let mut session = MockSession::new();
        session.expect_send().withf(to("a@example.com")).times(0);
        session
            .expect_send()
            .withf(to("b@example.com"))
            .times(1)
            .returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let report = dispatcher(transport_with(session), true)
            .dispatch(&spec(&text))
            .await?;

        assert_eq!(
            report.outcomes[0].status,
            DeliveryStatus::Failed(FailureReason::Unresolved(vec!["name".to_string()]))
        );
        assert_eq!(report.outcomes[1].status, DeliveryStatus::Sent);

        Ok(())
    }

    #[tokio::test]
    async fn test_open_failure_sends_nothing() {
        let mut transport = MockTransport::new();
        transport.expect_open().times(1).returning(|config| {
            Err(SessionError::Connect {
                host: config.host.clone(),
                port: config.port,
                reason: "connection refused".to_string(),
            })
        });

        let result = dispatcher(transport, true).dispatch(&spec(SPEC)).await;

        match result {
            Err(err @ DispatchError::Open(_)) => {
                assert!(err.report().is_none());
                assert!(err.to_string().contains("smtp.example.com:587"));
            }
            other => panic!("expected an open error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_failure_abandons_remaining_recipients() {
        let text = SPEC.replace(
            "      name: Bob\n",
            "      name: Bob\n  - address: c@example.com\n    fields:\n      name: Carol\n",
        );

        let mut session = MockSession::new();
        session
            .expect_send()
            .withf(to("a@example.com"))
            .times(1)
            .returning(|_| Ok(()));
        session
            .expect_send()
            .withf(to("b@example.com"))
            .times(1)
            .returning(|_| Err(SessionError::Broken("connection reset".to_string()).into()));
        session.expect_send().withf(to("c@example.com")).times(0);
        session.expect_close().times(1).returning(|| Ok(()));

        let result = dispatcher(transport_with(session), true)
            .dispatch(&spec(&text))
            .await;

        let report = match &result {
            Err(err @ DispatchError::SessionLost { .. }) => err.report().expect("report attached"),
            other => panic!("expected a lost session, got {other:?}"),
        };

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].status, DeliveryStatus::Sent);
        assert!(matches!(
            report.outcomes[1].status,
            DeliveryStatus::Failed(FailureReason::Session(_))
        ));
        assert!(matches!(
            report.outcomes[2].status,
            DeliveryStatus::Failed(FailureReason::Session(_))
        ));
        assert_eq!(report.summary().failed, 2);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_change_the_result() -> TestResult {
        let mut session = MockSession::new();
        session.expect_send().times(2).returning(|_| Ok(()));
        session
            .expect_close()
            .times(1)
            .returning(|| Err(SessionError::Broken("QUIT timed out".to_string())));

        let report = dispatcher(transport_with(session), true)
            .dispatch(&spec(SPEC))
            .await?;

        assert!(report.summary().all_sent());

        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_attachment_fails_before_opening_session() {
        let text = SPEC.replace(
            "  body: \"Dear {{name}}\"\n",
            "  body: \"Dear {{name}}\"\n  attachments:\n    - /definitely/not/here.pdf\n",
        );

        let mut transport = MockTransport::new();
        transport.expect_open().times(0);

        let result = dispatcher(transport, true).dispatch(&spec(&text)).await;

        assert!(matches!(result, Err(DispatchError::Build(_))));
    }

    #[tokio::test]
    async fn test_duplicate_recipients_fail_before_opening_session() -> TestResult {
        let text = SPEC.replace("b@example.com", "a@example.com");
        let document: Value = serde_yaml::from_str(&text)?;

        let mut transport = MockTransport::new();
        transport.expect_open().times(0);

        let result = dispatcher(transport, true).run(document).await;

        match result {
            Err(DispatchError::Schema(err)) => assert!(err.to_string().contains("a@example.com")),
            other => panic!("expected a schema error, got {other:?}"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_run_dispatches_a_valid_document() -> TestResult {
        let document: Value = serde_yaml::from_str(SPEC)?;

        let mut session = MockSession::new();
        session.expect_send().times(2).returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let report = dispatcher(transport_with(session), true)
            .run(document)
            .await?;

        assert_eq!(report.outcomes.len(), 2);

        Ok(())
    }
}
