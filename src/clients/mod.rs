pub mod anitabi;
pub mod bark;

pub use anitabi::AnitabiClient;
pub use bark::BarkNotifier;
