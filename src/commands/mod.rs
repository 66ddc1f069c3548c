pub mod export;
pub mod index;
pub mod keywords;
pub mod names;
