pub mod health;
pub mod stacks;
