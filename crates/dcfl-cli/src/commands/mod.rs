pub mod bounds;
pub mod cluster;
pub mod solve;
pub mod util;
