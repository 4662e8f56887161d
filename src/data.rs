pub mod allocation;
pub mod domain;
pub mod prices;
