pub(crate) mod answer_tracker;
pub(crate) mod errors;
pub(crate) mod exam_source;
pub(crate) mod question_bank;
pub(crate) mod randomization;
pub(crate) mod result_store;
pub(crate) mod scoring;
pub(crate) mod session_clock;
pub(crate) mod session_controller;
pub(crate) mod session_launch;
pub(crate) mod session_registry;
