pub mod calendar;
pub mod drive;
pub mod oauth;

pub use calendar::CalendarClient;
pub use drive::DriveClient;
pub use oauth::GoogleAuth;
