//! Order confirmation notifications.
//!
//! Sending is best-effort: callers log a failed notification and carry on.
//! `LogNotifier` writes the message to the log instead of delivering it.

use crate::{
    entities::{order, user},
    errors::Result,
};
use async_trait::async_trait;
use tracing::info;

/// A rendered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Builds the confirmation sent when an order is validated.
///
/// Returns `None` when the user has no email address (guest orders).
pub fn order_confirmation(from: &str, user: &user::Model, order: &order::Model) -> Option<Mail> {
    let to = user.email.as_deref().filter(|email| !email.trim().is_empty())?;
    let name = if user.first_name.is_empty() {
        user.username.as_str()
    } else {
        user.first_name.as_str()
    };

    let mut body = format!(
        "Bonjour {name},\n\nVotre commande du {} a été validée.\n\n\
         Montant brut : {} GNF\nSubvention : {} GNF\nNet : {} GNF\n",
        order.order_date.format("%d/%m/%Y"),
        order.gross_amount,
        order.subsidy_amount,
        order.net_amount,
    );
    if order.supplement_amount > rust_decimal::Decimal::ZERO {
        body.push_str(&format!(
            "Supplément à régler : {} GNF\n",
            order.supplement_amount
        ));
    }
    body.push_str("\nBon appétit !\n");

    Some(Mail {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Commande du {} validée", order.order_date.format("%d/%m/%Y")),
        body,
    })
}

/// Delivery channel for order notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a message
    async fn send(&self, mail: Mail) -> Result<()>;
}

/// Notifier that only logs the messages it is given
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, mail: Mail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "Sending mail");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::OrderState;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn sample_user(email: Option<&str>) -> user::Model {
        user::Model {
            id: 1,
            username: "awa".to_string(),
            email: email.map(ToString::to_string),
            first_name: "Awa".to_string(),
            password_hash: None,
            is_staff: false,
            is_superuser: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn sample_order(supplement: i64) -> order::Model {
        order::Model {
            id: 7,
            user_id: 1,
            order_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            state: OrderState::Validated,
            gross_amount: Decimal::from(30_000),
            subsidy_amount: Decimal::from(30_000),
            net_amount: Decimal::ZERO,
            supplement_amount: Decimal::from(supplement),
            operation_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_confirmation_mentions_supplement() {
        let mail = order_confirmation(
            "cantine@example.org",
            &sample_user(Some("awa@example.org")),
            &sample_order(15_000),
        )
        .unwrap();
        assert_eq!(mail.to, "awa@example.org");
        assert!(mail.subject.contains("05/01/2026"));
        assert!(mail.body.contains("Supplément à régler : 15000 GNF"));

        let mail = order_confirmation(
            "cantine@example.org",
            &sample_user(Some("awa@example.org")),
            &sample_order(0),
        )
        .unwrap();
        assert!(!mail.body.contains("Supplément"));
    }

    #[test]
    fn test_no_confirmation_without_email() {
        assert!(order_confirmation("x@y", &sample_user(None), &sample_order(0)).is_none());
        assert!(order_confirmation("x@y", &sample_user(Some("  ")), &sample_order(0)).is_none());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_mail() -> Result<()> {
        let mail = order_confirmation(
            "cantine@example.org",
            &sample_user(Some("awa@example.org")),
            &sample_order(0),
        )
        .unwrap();
        LogNotifier.send(mail).await
    }
}
