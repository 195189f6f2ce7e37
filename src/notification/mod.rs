pub mod mailer;

pub use mailer::{AuthorMailer, AuthorizationInvite, LogOnlyMailer, MailTemplate, WebhookMailer};
