pub mod dct;
pub mod duplicate;
pub mod grid;
pub mod hash;
pub mod scanner;
