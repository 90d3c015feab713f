pub mod characteristics;
pub mod clean;
pub mod computed;
pub mod intersect;
pub mod menu;
pub mod range_filter;
pub mod ranges;
