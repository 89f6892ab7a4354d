//! Cross-runner actor mailboxes: named mailboxes routed by a process-wide dispatcher,
//! and the `ActorService` that bridges a mailbox onto a runner's local event bus.

pub mod actor_service;
pub mod error;
pub mod mail;
pub mod mail_center;
pub mod mailbox;

pub use actor_service::{actor_service, ActorService};
pub use error::MailError;
pub use mail::{Mail, Target};
pub use mail_center::MailCenter;
pub use mailbox::MailBox;
