pub mod driver;
pub mod path;
pub mod pyramid;
pub mod stree;
