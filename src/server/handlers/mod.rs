pub mod drivers;
pub mod pricing;
pub mod riders;
pub mod rides;
