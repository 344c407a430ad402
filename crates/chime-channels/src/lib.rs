//! Delivery channels for Chime.
//!
//! This crate provides:
//! - `EmailSender`, `SmsSender` and `PushNotifier`, the channel interfaces the
//!   orchestrator fans out to
//! - `MailgunSender` and `TwilioWhatsAppSender`, HTTP implementations
//! - `SessionHub`, an in-process registry of live sessions that receive
//!   notification updates

mod error;
mod mailgun;
mod sender;
mod session;
mod twilio;

pub use error::ChannelError;
pub use mailgun::{MailgunConfig, MailgunSender};
pub use sender::{Email, EmailSender, NotificationUpdate, PushNotifier, SmsSender, WhatsAppMessage};
pub use session::{SessionHub, SessionId};
pub use twilio::{TwilioConfig, TwilioWhatsAppSender};
