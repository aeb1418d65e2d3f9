pub(crate) mod rescore;
pub(crate) mod scheduler;
pub(crate) mod session_runner;
