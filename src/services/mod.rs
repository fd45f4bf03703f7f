pub(crate) mod assignment;
pub(crate) mod exam_deletion;
pub(crate) mod exam_lifecycle;
pub(crate) mod grading;
pub(crate) mod session;
