pub mod axes;
pub mod margins;
