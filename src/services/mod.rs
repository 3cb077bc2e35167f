pub mod daily;
pub mod images;
pub mod monthly;

pub use daily::{DailyOutcome, DailyUpdateService};
pub use images::ImageService;
pub use monthly::{MonthlyOutcome, MonthlyUpdateService};
