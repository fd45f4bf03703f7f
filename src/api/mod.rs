pub(crate) mod errors;
pub(crate) mod exams;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod monitoring;
pub(crate) mod router;
pub(crate) mod sessions;
pub(crate) mod students;
pub(crate) mod submissions;
