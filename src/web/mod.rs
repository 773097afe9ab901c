pub mod cookies;
pub mod flash;
pub mod session;

pub use flash::{FlashRedirect, Notice, Notices, Page};
pub use session::{CurrentUser, SessionKeys};
