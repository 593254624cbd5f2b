//! Multi-provider email delivery for the fin.sankey report service.
//!
//! This crate provides:
//! - The `Mailer` trait and the SendGrid / Resend / SMTP adapters
//! - The failover `Dispatcher` with an append-only delivery audit trail
//! - The report email template

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod dispatcher;
pub mod resend;
pub mod sendgrid;
pub mod smtp;
pub mod template;
pub mod traits;

pub use dispatcher::{DeliveryReceipt, Dispatcher};
pub use resend::ResendMailer;
pub use sendgrid::SendGridMailer;
pub use smtp::SmtpMailer;
pub use traits::{Email, MailError, MailResult, Mailer, Sender};
