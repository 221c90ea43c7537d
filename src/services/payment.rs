use crate::error::{AppError, Result};
use crate::gateways::{CheckoutRequest, CheckoutResponse, PaymentGateway};
use crate::models::{
    PaymentMethod, PaymentStatus, PaymentTransaction, Ticket, TicketStatus, TransactionStatus,
};
use crate::notifications::{ticket_vars, NotificationKind, NotificationOutcome, NotificationService};
use crate::observability::{get_metrics, mask_amount, mask_phone, LatencyTimer};
use crate::repositories::{TicketStateUpdate, TicketingStore, TransactionSettlement};
use crate::services::ticket_lifecycle::{PaymentStateMachine, TicketStateMachine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of submitting a charge for a ticket.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSubmission {
    pub success: bool,
    /// The payer must approve the charge on their phone.
    pub requires_pin_confirmation: bool,
    pub payment_result: Option<CheckoutResponse>,
    pub transaction: PaymentTransaction,
    pub message: String,
}

/// Result of reconciling a transaction with the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub external_id: String,
    pub status: TransactionStatus,
    pub ticket_id: Uuid,
    pub ticket_status: Option<TicketStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub message: String,
    pub notification: Option<NotificationOutcome>,
}

/// Read-only view of a transaction and its ticket.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub external_id: String,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub ticket_id: Uuid,
    pub ticket_code: Option<String>,
    pub ticket_status: Option<TicketStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub updated_at: DateTime<Utc>,
}

pub struct PaymentService {
    store: Arc<dyn TicketingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
    currency: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn TicketingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifications,
            currency: currency.into(),
        }
    }

    /// Submits a charge for the ticket and records the gateway's answer.
    ///
    /// A refused or failed submission is a soft failure: the transaction and
    /// ticket are marked and `success = false` is returned.
    pub async fn submit_payment(&self, ticket: &Ticket, method: &PaymentMethod) -> Result<PaymentSubmission> {
        let external_id = ticket.payment_reference();
        let request = CheckoutRequest {
            account_number: ticket.purchaser_phone.clone(),
            amount: ticket.total_amount,
            currency: self.currency.clone(),
            provider: method.provider.clone(),
            reference: external_id.clone(),
            customer_name: ticket.purchaser_name.clone(),
            description: format!(
                "{} x {} ticket {}",
                ticket.quantity, ticket.ticket_type, ticket.ticket_code
            ),
        };

        info!(
            ticket_code = %ticket.ticket_code,
            provider = %method.provider,
            phone = %mask_phone(&ticket.purchaser_phone),
            amount = %mask_amount(&ticket.total_amount),
            "Submitting payment"
        );

        let timer = LatencyTimer::new();
        let answer = self.gateway.checkout(&request).await;
        get_metrics().record_gateway_latency("checkout", timer.elapsed_ms());

        let pending = PaymentTransaction::pending(
            ticket.id,
            external_id.clone(),
            method.provider.clone(),
            ticket.purchaser_phone.clone(),
            ticket.total_amount,
        );

        let submission = match answer {
            Ok(response) if response.is_success() => {
                let transaction = pending.with_metadata(json!({
                    "gateway_reference": response.external_id,
                    "checkout": response,
                }));
                self.store.record_payment_outcome(&transaction, None).await?;

                PaymentSubmission {
                    success: true,
                    requires_pin_confirmation: true,
                    message: "Payment request sent. Confirm with your PIN.".to_string(),
                    payment_result: Some(response),
                    transaction,
                }
            }
            Ok(response) => {
                let reason = response
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Gateway returned status '{}'", response.status));
                let mut transaction = pending
                    .with_error(reason.clone())
                    .with_metadata(json!({ "checkout": response }));
                transaction.status = TransactionStatus::Failed;
                self.fail_ticket(ticket, &transaction).await?;

                warn!(ticket_code = %ticket.ticket_code, reason = %reason, "Payment refused by gateway");
                PaymentSubmission {
                    success: false,
                    requires_pin_confirmation: false,
                    message: reason,
                    payment_result: Some(response),
                    transaction,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                let mut transaction = pending.with_error(reason.clone());
                transaction.status = TransactionStatus::Error;
                self.fail_ticket(ticket, &transaction).await?;

                error!(ticket_code = %ticket.ticket_code, error = %reason, "Payment submission errored");
                PaymentSubmission {
                    success: false,
                    requires_pin_confirmation: false,
                    message: "Payment could not be submitted. Please try again.".to_string(),
                    payment_result: None,
                    transaction,
                }
            }
        };

        get_metrics().record_payment_submission(
            &method.provider,
            submission.transaction.status.as_str(),
        );
        Ok(submission)
    }

    async fn fail_ticket(&self, ticket: &Ticket, transaction: &PaymentTransaction) -> Result<()> {
        let update = if TicketStateMachine::can_transition(ticket.status, TicketStatus::Failed)
            && PaymentStateMachine::can_transition(ticket.payment_status, PaymentStatus::Failed)
        {
            Some(TicketStateUpdate::failed(ticket.id))
        } else {
            None
        };
        self.store.record_payment_outcome(transaction, update).await
    }

    /// Reconciles a transaction with the gateway.
    ///
    /// Settled or final transactions are answered from the store without
    /// calling the gateway.
    pub async fn verify_payment(&self, external_id: &str) -> Result<PaymentVerification> {
        let transaction = self
            .store
            .find_transaction_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", external_id)))?;

        if transaction.status.is_settled() {
            return Ok(self
                .verification(&transaction, transaction.status, true, "Payment already completed", None)
                .await);
        }
        if transaction.status.is_final() {
            return Ok(self
                .verification(
                    &transaction,
                    transaction.status,
                    false,
                    "Payment is no longer pending",
                    None,
                )
                .await);
        }

        let lookup_id = transaction.gateway_reference().unwrap_or(&transaction.external_id).to_string();
        let timer = LatencyTimer::new();
        let answer = self.gateway.verify(&lookup_id).await;
        get_metrics().record_gateway_latency("verify", timer.elapsed_ms());

        let response = match answer {
            Ok(response) => response,
            Err(e) => {
                warn!(external_id = %external_id, error = %e, "Payment verification failed");
                get_metrics().record_payment_verification("GATEWAY_ERROR");
                return Ok(self
                    .verification(
                        &transaction,
                        TransactionStatus::Pending,
                        false,
                        "Could not reach the payment gateway. Try again shortly.",
                        None,
                    )
                    .await);
            }
        };

        let raw = serde_json::to_value(&response).unwrap_or_default();
        let reported = response.payment_status();

        let result = match reported {
            Some(status) if status.is_settled() => {
                let settled = self
                    .store
                    .settle_transaction(
                        TransactionSettlement {
                            transaction_id: transaction.id,
                            status: TransactionStatus::Completed,
                            error_message: None,
                            verification: Some(raw),
                        },
                        TicketStateUpdate::paid(transaction.ticket_id),
                    )
                    .await?;

                if settled {
                    info!(external_id = %external_id, "Payment completed");
                    let notification = self.send_confirmation(transaction.ticket_id).await;
                    self.verification(
                        &transaction,
                        TransactionStatus::Completed,
                        true,
                        "Payment completed",
                        notification,
                    )
                    .await
                } else {
                    // A concurrent verification settled it first.
                    self.current_state(external_id).await?
                }
            }
            Some(status @ (TransactionStatus::Failed | TransactionStatus::Cancelled)) => {
                let settled = self
                    .store
                    .settle_transaction(
                        TransactionSettlement {
                            transaction_id: transaction.id,
                            status: TransactionStatus::Failed,
                            error_message: Some(format!("Gateway reported {}", status.as_str())),
                            verification: Some(raw),
                        },
                        TicketStateUpdate::failed(transaction.ticket_id),
                    )
                    .await?;

                if settled {
                    warn!(external_id = %external_id, reported = ?status, "Payment failed");
                    self.verification(&transaction, TransactionStatus::Failed, false, "Payment failed", None)
                        .await
                } else {
                    self.current_state(external_id).await?
                }
            }
            _ => {
                self.verification(
                    &transaction,
                    TransactionStatus::Pending,
                    false,
                    "Payment is still pending confirmation",
                    None,
                )
                .await
            }
        };

        get_metrics().record_payment_verification(result.status.as_str());
        Ok(result)
    }

    async fn current_state(&self, external_id: &str) -> Result<PaymentVerification> {
        let transaction = self
            .store
            .find_transaction_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", external_id)))?;
        let settled = transaction.status.is_settled();
        Ok(self
            .verification(&transaction, transaction.status, settled, "Payment already reconciled", None)
            .await)
    }

    async fn verification(
        &self,
        transaction: &PaymentTransaction,
        status: TransactionStatus,
        success: bool,
        message: &str,
        notification: Option<NotificationOutcome>,
    ) -> PaymentVerification {
        // The outcome is already stored; a failed read only blanks the ticket fields.
        let ticket = match self.store.find_ticket_by_id(transaction.ticket_id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(ticket_id = %transaction.ticket_id, error = %e, "Could not load ticket for payment result");
                None
            }
        };
        PaymentVerification {
            success,
            external_id: transaction.external_id.clone(),
            status,
            ticket_id: transaction.ticket_id,
            ticket_status: ticket.as_ref().map(|t| t.status),
            payment_status: ticket.as_ref().map(|t| t.payment_status),
            message: message.to_string(),
            notification,
        }
    }

    async fn send_confirmation(&self, ticket_id: Uuid) -> Option<NotificationOutcome> {
        let ticket = match self.store.find_ticket_by_id(ticket_id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return None,
            Err(e) => {
                warn!(ticket_id = %ticket_id, error = %e, "Skipping payment confirmation SMS");
                return None;
            }
        };

        let vars = ticket_vars(self.store.as_ref(), &ticket).await;
        let outcome = self
            .notifications
            .notify(NotificationKind::PaymentConfirmation, &ticket.purchaser_phone, &vars)
            .await;
        Some(outcome)
    }

    /// Current state without side effects.
    pub async fn check_payment_status(&self, external_id: &str) -> Result<PaymentStatusView> {
        let transaction = self
            .store
            .find_transaction_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", external_id)))?;
        let ticket = self.store.find_ticket_by_id(transaction.ticket_id).await?;

        Ok(PaymentStatusView {
            external_id: transaction.external_id,
            status: transaction.status,
            error_message: transaction.error_message,
            ticket_id: transaction.ticket_id,
            ticket_code: ticket.as_ref().map(|t| t.ticket_code.clone()),
            ticket_status: ticket.as_ref().map(|t| t.status),
            payment_status: ticket.as_ref().map(|t| t.payment_status),
            updated_at: transaction.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::payment::MockPaymentGateway;
    use crate::gateways::sms::MockSmsSender;
    use crate::gateways::{SmsDelivery, VerifyResponse};
    use crate::models::{TicketMetadata, TicketSource, TicketType};
    use crate::repositories::MemoryStore;
    use rust_decimal_macros::dec;

    fn ticket() -> Ticket {
        Ticket::new(
            "TK123456781234".to_string(),
            Uuid::new_v4(),
            "Joseph Mrema".to_string(),
            "255713000222".to_string(),
            TicketType::Adult,
            dec!(15000),
            1,
            "mpesa".to_string(),
            TicketMetadata::new(TicketSource::Purchase { submitted_at: Utc::now() }, Uuid::new_v4()),
        )
    }

    fn method() -> PaymentMethod {
        PaymentMethod::new("mpesa", "M-Pesa", "Mpesa")
    }

    fn quiet_sms() -> NotificationService {
        let mut sms = MockSmsSender::new();
        sms.expect_send().returning(|_, _| Ok(SmsDelivery::delivered("m-1")));
        NotificationService::new(Arc::new(sms))
    }

    async fn stored(store: &MemoryStore) -> Ticket {
        let t = ticket();
        store.create_ticket_bundle(&t, &[], None).await.unwrap();
        t
    }

    #[tokio::test]
    async fn test_gateway_error_marks_ticket_failed() {
        let store = Arc::new(MemoryStore::new());
        let t = stored(&store).await;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_checkout()
            .returning(|_| Err(AppError::PaymentGateway("timed out".to_string())));

        let service = PaymentService::new(store.clone(), Arc::new(gateway), quiet_sms(), "TZS");
        let submission = service.submit_payment(&t, &method()).await.unwrap();

        assert!(!submission.success);
        assert_eq!(submission.transaction.status, TransactionStatus::Error);
        let saved = store.find_ticket_by_id(t.id).await.unwrap().unwrap();
        assert_eq!(saved.status, TicketStatus::Failed);
        assert_eq!(saved.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_verify_uses_gateway_reference() {
        let store = Arc::new(MemoryStore::new());
        let t = stored(&store).await;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_checkout()
            .returning(|_| Ok(CheckoutResponse::success("AZ-777")));
        gateway
            .expect_verify()
            .withf(|id| id.to_string() == "AZ-777")
            .times(1)
            .returning(|_| Ok(VerifyResponse::with_payment_status("PROCESSING")));

        let service = PaymentService::new(store.clone(), Arc::new(gateway), quiet_sms(), "TZS");
        service.submit_payment(&t, &method()).await.unwrap();

        let verification = service.verify_payment(&t.payment_reference()).await.unwrap();
        assert!(!verification.success);
        assert_eq!(verification.status, TransactionStatus::Pending);
        assert_eq!(verification.ticket_status, Some(TicketStatus::Pending));
    }

    #[tokio::test]
    async fn test_verify_unknown_transaction_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = PaymentService::new(
            store,
            Arc::new(MockPaymentGateway::new()),
            quiet_sms(),
            "TZS",
        );
        let result = service.verify_payment("TICKET-NOPE").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
