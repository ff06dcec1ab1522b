pub mod aggregate;
pub mod db;
pub mod domain;
pub mod simulation;
