pub(crate) mod exams;
pub(crate) mod health;
pub(crate) mod questions;
pub(crate) mod results;
