pub mod axes_draw;
pub mod matrix;
pub mod step;
