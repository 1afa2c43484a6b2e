pub mod message;
pub mod outcome;
pub mod policy;
pub mod validation;
