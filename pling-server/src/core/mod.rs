pub mod error;
pub mod types;

pub use error::{PlingError, Result};
pub use types::{NewNotification, Notification, NotificationKind, Priority, UserIdentity};
