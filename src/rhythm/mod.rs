pub mod grid;
pub mod quantize;
pub mod segment;
