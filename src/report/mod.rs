//! Terminal reporting for a finished run: status summary, packages needing
//! attention, and the head of the diagnostic log.

pub mod terminal;
