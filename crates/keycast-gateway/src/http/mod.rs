pub mod broadcast;
pub mod health;
pub mod members;
