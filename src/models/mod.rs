pub mod credential;
pub mod outcome;
pub mod publication;
pub mod work;
