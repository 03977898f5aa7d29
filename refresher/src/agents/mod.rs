//! Agent producing the editable-region fragment.

pub mod webmaster;
