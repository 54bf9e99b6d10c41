pub mod email;
pub mod encryption;
pub mod jwt;
pub mod password;
pub mod security;

pub use email::{Mailer, SmtpMailer};
pub use encryption::FieldCipher;
pub use jwt::*;
pub use password::*;
pub use security::*;
