pub mod revisions;
pub mod run;
pub mod validate;
