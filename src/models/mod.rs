pub mod anime;
pub mod point;

pub use anime::{AnimeInfo, RawAnimeInfo};
pub use point::Point;
