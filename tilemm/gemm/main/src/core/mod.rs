pub mod arch;
pub mod dispatch;
pub mod ops;
pub mod parallel;
pub mod scalar;
pub mod tile;
pub mod transpose;
pub mod vector;
pub mod widen;
