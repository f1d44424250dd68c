pub mod health;
pub mod membership;
