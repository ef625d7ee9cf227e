//! Record shaping and numeric normalization.

pub mod normalize;
pub mod shape;

pub use normalize::{fmt_decimal_str, DecimalFormats};
pub use shape::{shape_rows, RowShape};
